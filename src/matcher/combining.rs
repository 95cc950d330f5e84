use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::debug;

use crate::{
    matcher::{
        DeferredMatching, HintCache, KnownTypesIndex, MatchContext, MatchRecorder, MatchSet,
        TypeMatcher,
    },
    module::ModuleId,
    utils::panic_message,
    Error,
};

/// Annotations marking CDI decorators, which are never transformed.
pub const DECORATOR_ANNOTATIONS: [&str; 2] = [
    "javax.decorator.Decorator",
    "jakarta.decorator.Decorator",
];

/// Evaluates every module's predicates against one class in a single pass.
///
/// A pass clears the caller's [`MatchSet`], ORs in the known-types index hits for the class
/// name (restricted to the ids that were registered), then runs every [`MatchRecorder`] in
/// registration order. A recorder that fails, by error or by panic, is logged and contributes
/// nothing; the other modules are unaffected.
///
/// The matcher is immutable after construction and shared by all class-loading threads;
/// each caller brings its own scratch set.
#[derive(Debug, Clone)]
pub struct CombiningMatcher {
    known_types: Arc<KnownTypesIndex>,
    known_mask: MatchSet,
    recorders: Vec<MatchRecorder>,
    hints: Arc<HintCache>,
    deferral: Arc<DeferredMatching>,
}

impl CombiningMatcher {
    /// Creates a matcher.
    ///
    /// # Arguments
    ///
    /// * `known_types` - ahead-of-time index of class name to module ids
    /// * `known_mask` - ids allowed to be set from `known_types`
    /// * `recorders` - recorders in evaluation order
    /// * `hints` - shared class visibility cache
    /// * `deferral` - deferred matching state
    #[must_use]
    pub fn new(
        known_types: Arc<KnownTypesIndex>,
        known_mask: MatchSet,
        recorders: Vec<MatchRecorder>,
        hints: Arc<HintCache>,
        deferral: Arc<DeferredMatching>,
    ) -> Self {
        Self {
            known_types,
            known_mask,
            recorders,
            hints,
            deferral,
        }
    }

    /// Match `ctx`, leaving every matched id in `set`.
    ///
    /// Returns `false` without evaluating anything when deferral applies to `ctx`.
    pub fn match_class(&self, ctx: &MatchContext<'_>, set: &mut MatchSet) -> bool {
        if self.deferral.defers(ctx) {
            set.clear();
            return false;
        }
        self.evaluate(ctx, set)
    }

    /// Match `ctx` ignoring deferral. Used by the catch-up rescan.
    pub fn would_match(&self, ctx: &MatchContext<'_>, set: &mut MatchSet) -> bool {
        self.evaluate(ctx, set)
    }

    fn evaluate(&self, ctx: &MatchContext<'_>, set: &mut MatchSet) -> bool {
        set.clear();

        if let Some(hits) = self.known_types.lookup(&ctx.class.name) {
            set.union_masked(hits, &self.known_mask);
        }

        for recorder in &self.recorders {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                recorder.record(ctx, &self.hints, set)
            }))
            .unwrap_or_else(|payload| {
                Err(Error::Predicate {
                    matcher: format!("module {}", recorder.id()),
                    message: panic_message(payload.as_ref()),
                })
            });
            if let Err(e) = outcome {
                debug!(
                    "Failed to match {} for module {}: {}",
                    ctx.class.name,
                    recorder.id(),
                    e
                );
            }
        }

        if !set.is_empty() && is_decorator(ctx) {
            debug!("Ignoring decorator {}", ctx.class.name);
            set.clear();
        }

        !set.is_empty()
    }

    /// Matcher that only evaluates module `id`: its known-type names become a leading
    /// [`MatchRecorder::ForType`], followed by its own recorders in registration order.
    ///
    /// This is how the legacy deployment keeps per-module passes observably identical to
    /// the combined pass.
    #[must_use]
    pub fn for_module(&self, id: ModuleId) -> CombiningMatcher {
        let mut recorders = Vec::new();

        if self.known_mask.contains(id) {
            let names = self.known_types.names_for(id);
            if !names.is_empty() {
                recorders.push(MatchRecorder::ForType {
                    id,
                    matcher: TypeMatcher::named_one_of(names),
                });
            }
        }
        recorders.extend(self.recorders.iter().filter(|r| r.id() == id).cloned());

        CombiningMatcher {
            known_types: Arc::new(KnownTypesIndex::new()),
            known_mask: MatchSet::new(),
            recorders,
            hints: self.hints.clone(),
            deferral: self.deferral.clone(),
        }
    }

    /// Recorders in evaluation order.
    #[must_use]
    pub fn recorders(&self) -> &[MatchRecorder] {
        &self.recorders
    }

    /// Ids that can be set from the known-types index.
    #[must_use]
    pub fn known_mask(&self) -> &MatchSet {
        &self.known_mask
    }

    /// The known-types index.
    #[must_use]
    pub fn known_types(&self) -> &Arc<KnownTypesIndex> {
        &self.known_types
    }

    /// The class visibility cache.
    #[must_use]
    pub fn hints(&self) -> &Arc<HintCache> {
        &self.hints
    }

    /// The deferred matching state.
    #[must_use]
    pub fn deferral(&self) -> &Arc<DeferredMatching> {
        &self.deferral
    }
}

fn is_decorator(ctx: &MatchContext<'_>) -> bool {
    DECORATOR_ANNOTATIONS
        .iter()
        .any(|annotation| ctx.class.is_annotated_with(annotation))
}
