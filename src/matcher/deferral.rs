//! Deferred matching.
//!
//! Matching every class of a large application at startup is expensive. When configured,
//! the agent postpones matching for initial definitions on a chosen set of class loaders and
//! catches up later with one batch retransformation:
//!
//! 1. While [`MatchingState::Deferring`], initial definitions on a deferred loader are
//!    reported as non-matching without evaluating any predicate. Redefinitions are matched
//!    normally.
//! 2. Once the delay elapses, a background thread switches to [`MatchingState::Active`] and
//!    walks every loaded class, skipping lambda classes, globally ignored classes and classes
//!    the runtime cannot modify.
//! 3. The remaining classes are checked with [`CombiningMatcher::would_match`] in parallel;
//!    every class that would match is submitted in a single retransformation request.
//!
//! A rejected batch is logged and not retried. Deferral is already inactive at that point,
//! so any later natural redefinition is matched normally.
//!
//! Deferral only starts when the delay is longer than [`MIN_DEFER_DELAY`] and at least one
//! loader is named. Without both, the matcher starts in [`MatchingState::Active`] and never
//! defers.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{after, select, Receiver};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    host::{Instrumentation, LoadedClass},
    matcher::{CombiningMatcher, GlobalIgnores, MatchContext, MatchSet},
    Result,
};

/// Delays up to this value never enable deferral.
pub const MIN_DEFER_DELAY: Duration = Duration::from_secs(5);

/// Name of the thread running the catch-up rescan.
pub const DEFERRAL_THREAD_NAME: &str = "classweave-deferred-matching";

/// State of the deferred-matching protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingState {
    /// Every definition is matched.
    Active,
    /// Initial definitions on deferred loaders are not matched.
    Deferring,
}

impl fmt::Display for MatchingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingState::Active => write!(f, "ACTIVE"),
            MatchingState::Deferring => write!(f, "DEFERRING"),
        }
    }
}

/// Deferred-matching state shared by every matcher of one agent.
#[derive(Debug)]
pub struct DeferredMatching {
    deferring: AtomicBool,
    delay: Option<Duration>,
    loaders: HashSet<String>,
}

impl DeferredMatching {
    /// Create the protocol state. Deferral starts only if `delay` exceeds
    /// [`MIN_DEFER_DELAY`] and `loaders` is non-empty.
    #[must_use]
    pub fn new<I, S>(delay: Option<Duration>, loaders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let loaders: HashSet<String> = loaders.into_iter().map(Into::into).collect();
        let delay = delay.filter(|d| *d > MIN_DEFER_DELAY && !loaders.is_empty());
        if let Some(delay) = delay {
            debug!(
                "Deferring matching for {} class loader(s) by {}s",
                loaders.len(),
                delay.as_secs()
            );
        }

        Self {
            deferring: AtomicBool::new(delay.is_some()),
            delay,
            loaders,
        }
    }

    /// State that never defers.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            deferring: AtomicBool::new(false),
            delay: None,
            loaders: HashSet::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MatchingState {
        if self.deferring.load(Ordering::Acquire) {
            MatchingState::Deferring
        } else {
            MatchingState::Active
        }
    }

    /// Returns `true` while deferring.
    #[must_use]
    pub fn is_deferring(&self) -> bool {
        self.state() == MatchingState::Deferring
    }

    /// Delay after which matching resumes, if deferral was enabled.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Whether the pass for `ctx` must be skipped: deferring, initial definition and
    /// defined by a deferred loader.
    #[must_use]
    pub fn defers(&self, ctx: &MatchContext<'_>) -> bool {
        self.is_deferring()
            && !ctx.redefining
            && ctx
                .loader
                .is_some_and(|loader| self.loaders.contains(loader.class_name()))
    }

    /// Switch to [`MatchingState::Active`]. Returns `true` if this call ended deferral.
    pub fn resume(&self) -> bool {
        self.deferring.swap(false, Ordering::AcqRel)
    }

    /// End deferral and retransform every loaded class that would now match.
    ///
    /// Returns the number of classes submitted for retransformation; `0` if deferral had
    /// already ended.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the batch retransformation is rejected.
    pub fn resume_and_rescan(
        &self,
        matcher: &CombiningMatcher,
        host: &dyn Instrumentation,
        ignores: &GlobalIgnores,
    ) -> Result<usize> {
        if !self.resume() {
            return Ok(0);
        }

        let loaded = host.loaded_classes();
        let candidates: Vec<&LoadedClass> = loaded
            .iter()
            .filter(|class| !ignores.is_ignored(class.name()))
            .filter(|class| host.is_modifiable(class))
            .collect();

        let matched: Vec<LoadedClass> = candidates
            .par_iter()
            .map_init(MatchSet::new, |set, class| {
                let ctx = MatchContext::define(&class.descriptor, class.loader.as_ref());
                matcher.would_match(&ctx, set).then(|| (*class).clone())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        info!(
            "Deferred matching resumed: {} of {} loaded classes need retransformation",
            matched.len(),
            loaded.len()
        );
        if matched.is_empty() {
            return Ok(0);
        }

        host.retransform(&matched)?;
        Ok(matched.len())
    }
}

/// Spawn the timer thread that ends deferral after the configured delay.
///
/// Returns `None` when the matcher is not deferring. Dropping the sender side of `shutdown`
/// stops a pending timer; deferral then never ends on its own.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the thread cannot be spawned.
pub fn spawn_deferred_rescan(
    matcher: Arc<CombiningMatcher>,
    host: Arc<dyn Instrumentation>,
    ignores: Arc<GlobalIgnores>,
    shutdown: Receiver<()>,
) -> Result<Option<JoinHandle<()>>> {
    let deferral = matcher.deferral().clone();
    let Some(delay) = deferral.delay().filter(|_| deferral.is_deferring()) else {
        return Ok(None);
    };

    let handle = std::thread::Builder::new()
        .name(DEFERRAL_THREAD_NAME.to_string())
        .spawn(move || {
            select! {
                recv(shutdown) -> _ => {
                    debug!("Deferred matching cancelled before resuming");
                }
                recv(after(delay)) -> _ => {
                    if let Err(e) = deferral.resume_and_rescan(&matcher, host.as_ref(), &ignores) {
                        warn!("Deferred retransformation failed: {e}");
                    }
                }
            }
        })?;

    Ok(Some(handle))
}
