use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::{
    config::{AgentConfig, InstallStrategy},
    host::{BytecodeEngine, ClassFileTransformer, ClassLoadEvent, Instrumentation},
    installer::{
        CombiningPipeline, CombiningTransformerBuilder, InstalledModule, LegacyTransformer,
        MatcherCaches,
    },
    matcher::{
        spawn_deferred_rescan, CombiningMatcher, DeferredMatching, GlobalIgnores, HintCache,
        MatchContext, MatchSet, MatchingState,
    },
    module::{InstrumentationStatus, ModuleDescriptor, ModuleId, ModuleIndex},
    transform::{ClassBuilder, SplittingTransformer},
    Result,
};

/// Name of the periodic cache reset thread.
pub const RESET_THREAD_NAME: &str = "classweave-cache-reset";

thread_local! {
    static SCRATCH: RefCell<MatchSet> = const { RefCell::new(MatchSet::new()) };
}

/// Run `f` with this thread's scratch set, or a fresh one when the scratch set is already
/// borrowed by an outer pass on the same thread.
fn with_scratch<R>(f: impl FnOnce(&mut MatchSet) -> R) -> R {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut set) => f(&mut set),
        Err(_) => f(&mut MatchSet::new()),
    })
}

/// One match-then-transform pass over a class load event.
///
/// Returns `Ok(None)` when the class is left unchanged, including when it cannot be
/// described. Only a failure to materialize the edited class is an error.
pub(crate) fn transform_event(
    matcher: &CombiningMatcher,
    transformer: &SplittingTransformer,
    engine: &dyn BytecodeEngine,
    ignores: &GlobalIgnores,
    event: &ClassLoadEvent,
) -> Result<Option<Vec<u8>>> {
    if ignores.is_ignored(&event.class_name) {
        return Ok(None);
    }

    let class = match engine.describe(event) {
        Ok(class) => class,
        Err(e) => {
            debug!("Cannot describe {}: {e}", event.class_name);
            return Ok(None);
        }
    };

    let loader = event.loader.as_ref();
    let ctx = if event.is_redefinition() {
        MatchContext::redefine(&class, loader)
    } else {
        MatchContext::define(&class, loader)
    };

    let mut builder = ClassBuilder::new(&class.name);
    let applied = with_scratch(|set| {
        if matcher.match_class(&ctx, set) {
            transformer.transform(&mut builder, &class, loader, set)
        } else {
            0
        }
    });

    if applied == 0 || builder.is_empty() {
        return Ok(None);
    }
    engine.materialize(event, &builder).map(Some)
}

/// Run `pass`, turning a panic into "no change".
pub(crate) fn guarded(
    class_name: &str,
    pass: impl FnOnce() -> Result<Option<Vec<u8>>>,
) -> Result<Option<Vec<u8>>> {
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(result) => result,
        Err(_) => {
            error!("Instrumentation of {class_name} panicked, class left unchanged");
            Ok(None)
        }
    }
}

/// The single host transformer of the combining strategy.
pub struct CombiningTransformer {
    matcher: Arc<CombiningMatcher>,
    transformer: Arc<SplittingTransformer>,
    engine: Arc<dyn BytecodeEngine>,
    ignores: Arc<GlobalIgnores>,
}

impl CombiningTransformer {
    /// Creates the host transformer for `pipeline`.
    #[must_use]
    pub fn new(
        pipeline: &CombiningPipeline,
        engine: Arc<dyn BytecodeEngine>,
        ignores: Arc<GlobalIgnores>,
    ) -> Self {
        Self {
            matcher: pipeline.matcher().clone(),
            transformer: pipeline.transformer().clone(),
            engine,
            ignores,
        }
    }
}

impl ClassFileTransformer for CombiningTransformer {
    fn transform(&self, event: &ClassLoadEvent) -> Result<Option<Vec<u8>>> {
        guarded(&event.class_name, || {
            transform_event(
                &self.matcher,
                &self.transformer,
                self.engine.as_ref(),
                &self.ignores,
                event,
            )
        })
    }
}

/// Installs instrumentation modules into a host runtime.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use classweave::host::memory::{original_bytes, InMemoryRuntime};
/// use classweave::installer::AgentInstaller;
/// use classweave::matcher::ClassDescriptor;
/// use classweave::module::{MatchStrategy, ModuleDescriptor, ModuleIndex};
/// use classweave::AgentConfig;
///
/// let modules = vec![
///     ModuleDescriptor::new("jdbc", MatchStrategy::SingleType("java.sql.Driver".into()))
///         .helper("com.acme.JdbcDecorator"),
/// ];
/// let index = Arc::new(ModuleIndex::build(&modules)?);
/// let runtime = Arc::new(InMemoryRuntime::new());
///
/// let handle = AgentInstaller::new(AgentConfig::default()).install(
///     runtime.clone(),
///     runtime.clone(),
///     index,
///     &modules,
/// )?;
///
/// let bytes = runtime.define(ClassDescriptor::new("java.sql.Driver"), None)?;
/// assert_ne!(bytes, original_bytes("java.sql.Driver"));
/// handle.shutdown();
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AgentInstaller {
    config: AgentConfig,
}

impl AgentInstaller {
    /// Creates an installer for `config`.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// The installer's configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Register every enabled module and add the resulting transformer(s) to `host`.
    ///
    /// Modules disabled by configuration are skipped. A module that fails to register is
    /// logged and skipped; the others are installed regardless.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if a background thread cannot be spawned.
    pub fn install(
        &self,
        host: Arc<dyn Instrumentation>,
        engine: Arc<dyn BytecodeEngine>,
        index: Arc<ModuleIndex>,
        modules: &[ModuleDescriptor],
    ) -> Result<AgentHandle> {
        let status = Arc::new(InstrumentationStatus::new());
        let deferral = Arc::new(DeferredMatching::new(
            self.config.defer_until,
            self.config.deferred_loaders.iter().cloned(),
        ));
        let ignores = Arc::new(GlobalIgnores::new(self.config.excludes.iter().cloned()));

        let mut builder = CombiningTransformerBuilder::new(index)
            .with_status(status)
            .with_hints(Arc::new(HintCache::with_capacity(
                self.config.resolver_cache_capacity,
            )))
            .with_deferral(deferral)
            .with_runtime_context_injection(self.config.runtime_context_injection);

        for module in modules {
            let Some(module) = self.config.installable(module) else {
                debug!("Module {} disabled by configuration", module.name);
                continue;
            };
            if let Err(e) = builder.register(&module) {
                error!("Failed to register module {}: {e}", module.name);
            }
        }
        let pipeline = builder.build();

        match self.config.strategy {
            InstallStrategy::Combining => {
                host.add_transformer(Arc::new(CombiningTransformer::new(
                    &pipeline,
                    engine,
                    ignores.clone(),
                )));
            }
            InstallStrategy::Legacy => {
                for transformer in LegacyTransformer::split(&pipeline, &engine, &ignores) {
                    host.add_transformer(Arc::new(transformer));
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut threads = Vec::new();
        if let Some(handle) = spawn_deferred_rescan(
            pipeline.matcher().clone(),
            host.clone(),
            ignores.clone(),
            shutdown_rx.clone(),
        )? {
            threads.push(handle);
        }
        if let Some(interval) = self.config.resolver_reset_interval {
            threads.push(spawn_cache_reset(
                pipeline.caches().clone(),
                interval,
                shutdown_rx,
            )?);
        }

        info!(
            "Installed {} instrumentation ids ({:?} strategy, matching {})",
            pipeline.modules().len(),
            self.config.strategy,
            pipeline.matcher().deferral().state()
        );

        Ok(AgentHandle {
            pipeline,
            host,
            ignores,
            strategy: self.config.strategy,
            shutdown: Some(shutdown_tx),
            threads,
        })
    }
}

fn spawn_cache_reset(
    caches: MatcherCaches,
    interval: Duration,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name(RESET_THREAD_NAME.to_string())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(shutdown) -> _ => break,
                    recv(ticker) -> _ => caches.reset(),
                }
            }
        })?;
    Ok(handle)
}

/// Handle on an installed agent.
///
/// Dropping the handle stops the background threads; the transformers stay registered
/// with the host.
pub struct AgentHandle {
    pipeline: CombiningPipeline,
    host: Arc<dyn Instrumentation>,
    ignores: Arc<GlobalIgnores>,
    strategy: InstallStrategy,
    shutdown: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// Per-module outcome counters.
    #[must_use]
    pub fn status(&self) -> &Arc<InstrumentationStatus> {
        self.pipeline.transformer().status()
    }

    /// Current deferred-matching state.
    #[must_use]
    pub fn state(&self) -> MatchingState {
        self.pipeline.matcher().deferral().state()
    }

    /// The strategy the agent was installed with.
    #[must_use]
    pub fn strategy(&self) -> InstallStrategy {
        self.strategy
    }

    /// Every installed id.
    #[must_use]
    pub fn modules(&self) -> &[InstalledModule] {
        self.pipeline.modules()
    }

    /// Id of the module named `name`.
    #[must_use]
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.pipeline.module_id(name)
    }

    /// The installed pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &CombiningPipeline {
        &self.pipeline
    }

    /// End deferred matching now instead of waiting for the timer.
    ///
    /// Returns the number of classes submitted for retransformation.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the batch retransformation is rejected.
    pub fn resume_deferred_matching(&self) -> Result<usize> {
        let matcher = self.pipeline.matcher();
        matcher
            .deferral()
            .resume_and_rescan(matcher, self.host.as_ref(), &self.ignores)
    }

    /// Clear the hint cache and muzzle verdicts.
    pub fn reset_caches(&self) {
        self.pipeline.caches().reset();
    }

    /// Stop the background threads and wait for them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // disconnecting wakes every select on the receiver
        drop(self.shutdown.take());
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Agent background thread panicked");
            }
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("strategy", &self.strategy)
            .field("modules", &self.pipeline.modules().len())
            .field("state", &self.state())
            .field("threads", &self.threads.len())
            .finish()
    }
}
