use std::sync::Arc;

use log::debug;

use crate::{
    matcher::{
        CombiningMatcher, DeferredMatching, HintCache, LoaderMatcher, MatchRecorder, MatchSet,
        TypeMatcher,
    },
    module::{
        InstrumentationStatus, MatchStrategy, ModuleDescriptor, ModuleFlags, ModuleId,
        ModuleIndex, MuzzleCheck,
    },
    transform::{SplittingTransformer, TransformStack, TransformStep, TransformerTable},
    Error, Result,
};

/// What a registered id stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledKind {
    /// A declared module.
    Module,
    /// A context-store field injector.
    ContextStore {
        /// Key type receiving the field.
        key: String,
        /// Stored value type.
        value: String,
    },
}

/// One id registered in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    /// Assigned id.
    pub id: ModuleId,
    /// Module name, or `key->value` for context-store injectors.
    pub name: String,
    /// What the id stands for.
    pub kind: InstalledKind,
}

/// Caches that the periodic reset clears.
#[derive(Debug, Clone)]
pub struct MatcherCaches {
    hints: Arc<HintCache>,
    muzzles: Vec<Arc<MuzzleCheck>>,
}

impl MatcherCaches {
    /// Clear the hint cache and every muzzle verdict.
    pub fn reset(&self) {
        self.hints.reset();
        for muzzle in &self.muzzles {
            muzzle.reset();
        }
        debug!("Reset matcher caches ({} muzzle checks)", self.muzzles.len());
    }
}

/// The assembled combining pipeline.
#[derive(Debug, Clone)]
pub struct CombiningPipeline {
    matcher: Arc<CombiningMatcher>,
    transformer: Arc<SplittingTransformer>,
    modules: Vec<InstalledModule>,
    caches: MatcherCaches,
}

impl CombiningPipeline {
    /// The combined matcher.
    #[must_use]
    pub fn matcher(&self) -> &Arc<CombiningMatcher> {
        &self.matcher
    }

    /// The splitting transformer.
    #[must_use]
    pub fn transformer(&self) -> &Arc<SplittingTransformer> {
        &self.transformer
    }

    /// Every registered id in ascending order, modules first, context-store injectors last.
    #[must_use]
    pub fn modules(&self) -> &[InstalledModule] {
        &self.modules
    }

    /// Id registered for the module named `name`.
    #[must_use]
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .iter()
            .find(|m| m.kind == InstalledKind::Module && m.name == name)
            .map(|m| m.id)
    }

    /// The resettable caches.
    #[must_use]
    pub fn caches(&self) -> &MatcherCaches {
        &self.caches
    }
}

#[derive(Debug)]
struct ContextStoreInjection {
    key: String,
    value: String,
    activation: LoaderMatcher,
}

/// Assembles the combining matcher and splitting transformer from module descriptors.
///
/// Each registered module receives its id from the [`ModuleIndex`], or a dynamic id above
/// the static range when the index does not know it. Enumerable type strategies of static
/// modules are served by the known-types index; everything else becomes
/// [`MatchRecorder`]s, registered base recorders first and refinements after, with the
/// muzzle check last. Context stores declared by the modules are turned into dedicated
/// injector ids when [`CombiningTransformerBuilder::build`] runs, above every module id.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use classweave::installer::CombiningTransformerBuilder;
/// use classweave::module::{MatchStrategy, ModuleDescriptor, ModuleIndex};
///
/// let modules = vec![
///     ModuleDescriptor::new("jdbc", MatchStrategy::SingleType("java.sql.Driver".into()))
///         .helper("com.acme.JdbcDecorator"),
/// ];
/// let index = Arc::new(ModuleIndex::build(&modules)?);
///
/// let mut builder = CombiningTransformerBuilder::new(index);
/// for module in &modules {
///     builder.register(module)?;
/// }
/// let pipeline = builder.build();
/// assert_eq!(pipeline.module_id("jdbc").map(|id| id.index()), Some(0));
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug)]
pub struct CombiningTransformerBuilder {
    index: Arc<ModuleIndex>,
    status: Arc<InstrumentationStatus>,
    hints: Arc<HintCache>,
    deferral: Arc<DeferredMatching>,
    runtime_context_injection: bool,
    known_mask: MatchSet,
    recorders: Vec<MatchRecorder>,
    table: TransformerTable,
    next_dynamic: usize,
    modules: Vec<InstalledModule>,
    context_stores: Vec<ContextStoreInjection>,
    muzzles: Vec<Arc<MuzzleCheck>>,
}

impl CombiningTransformerBuilder {
    /// Creates a builder over `index` with fresh status, hint cache and no deferral.
    #[must_use]
    pub fn new(index: Arc<ModuleIndex>) -> Self {
        let static_len = index.static_len();
        Self {
            index,
            status: Arc::new(InstrumentationStatus::new()),
            hints: Arc::new(HintCache::new()),
            deferral: Arc::new(DeferredMatching::inactive()),
            runtime_context_injection: true,
            known_mask: MatchSet::with_capacity(static_len),
            recorders: Vec::new(),
            table: TransformerTable::with_len(static_len),
            next_dynamic: static_len,
            modules: Vec::new(),
            context_stores: Vec::new(),
            muzzles: Vec::new(),
        }
    }

    /// Report transform failures and muzzle rejections to `status`.
    #[must_use]
    pub fn with_status(mut self, status: Arc<InstrumentationStatus>) -> Self {
        self.status = status;
        self
    }

    /// Share `hints` with the built matcher.
    #[must_use]
    pub fn with_hints(mut self, hints: Arc<HintCache>) -> Self {
        self.hints = hints;
        self
    }

    /// Use `deferral` as the matcher's deferred-matching state.
    #[must_use]
    pub fn with_deferral(mut self, deferral: Arc<DeferredMatching>) -> Self {
        self.deferral = deferral;
        self
    }

    /// Enable or disable context-store injector ids.
    #[must_use]
    pub fn with_runtime_context_injection(mut self, enable: bool) -> Self {
        self.runtime_context_injection = enable;
        self
    }

    fn allocate_dynamic(&mut self) -> ModuleId {
        let id = ModuleId::from_index(self.next_dynamic);
        self.next_dynamic += 1;
        id
    }

    /// Register `module` and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModule`] if the descriptor fails validation or a module of
    /// the same name is already registered. Nothing is registered in that case.
    pub fn register(&mut self, module: &ModuleDescriptor) -> Result<ModuleId> {
        module.validate()?;

        let static_id = self.index.id_of(&module.name);
        let id = match static_id {
            Some(id) if self.table.contains(id) => {
                return Err(Error::InvalidModule {
                    module: module.name.clone(),
                    reason: "registered twice".to_string(),
                });
            }
            Some(id) => id,
            None => {
                if self.module_registered(&module.name) {
                    return Err(Error::InvalidModule {
                        module: module.name.clone(),
                        reason: "registered twice".to_string(),
                    });
                }
                self.allocate_dynamic()
            }
        };

        self.build_type_matcher(id, static_id.is_some(), module);
        let stack = self.build_type_advice(module);
        self.table.set(id, stack);
        self.modules.push(InstalledModule {
            id,
            name: module.name.clone(),
            kind: InstalledKind::Module,
        });

        debug!(
            "Registered module {} as {} ({} recorders)",
            module.name,
            id,
            self.recorders.iter().filter(|r| r.id() == id).count()
        );
        Ok(id)
    }

    fn module_registered(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    fn build_type_matcher(&mut self, id: ModuleId, is_static: bool, module: &ModuleDescriptor) {
        match &module.strategy {
            MatchStrategy::SingleType(_) | MatchStrategy::KnownTypes(_) => {
                self.record_known_types(id, is_static, module.strategy.known_types());
            }
            MatchStrategy::Hierarchy { marker, matcher } => {
                self.recorders.push(MatchRecorder::ForHierarchy {
                    id,
                    hint: marker.as_ref().map(LoaderMatcher::has_class_named),
                    matcher: matcher.clone(),
                });
            }
            MatchStrategy::CallSite(matcher) => {
                self.recorders.push(MatchRecorder::ForType {
                    id,
                    matcher: matcher.clone(),
                });
            }
            MatchStrategy::ConfiguredTypes(names) => {
                if !names.is_empty() {
                    self.recorders.push(MatchRecorder::ForType {
                        id,
                        matcher: TypeMatcher::named_one_of(names.iter().cloned()),
                    });
                }
            }
            MatchStrategy::Shortcut {
                known,
                hierarchy,
                marker,
                only_known,
            } => {
                self.record_known_types(id, is_static, known);
                if !only_known {
                    self.recorders.push(MatchRecorder::ForHierarchy {
                        id,
                        hint: marker.as_ref().map(LoaderMatcher::has_class_named),
                        matcher: hierarchy.clone(),
                    });
                }
            }
        }

        if !module.loader_matcher.is_any() {
            self.recorders.push(MatchRecorder::NarrowLocation {
                id,
                matcher: module.loader_matcher.clone(),
            });
        }

        if let Some(structure) = &module.structure {
            self.recorders.push(MatchRecorder::NarrowType {
                id,
                matcher: structure.clone(),
            });
        }

        if !module.flags.contains(ModuleFlags::AGENT_CODE_SOURCE)
            && !module.muzzle_references.is_empty()
        {
            let muzzle = Arc::new(
                MuzzleCheck::new(id, module.name.clone(), module.muzzle_references.clone())
                    .with_status(self.status.clone()),
            );
            self.muzzles.push(muzzle.clone());
            self.recorders.push(MatchRecorder::NarrowLocation {
                id,
                matcher: LoaderMatcher::Muzzle(muzzle),
            });
        }
    }

    fn record_known_types(&mut self, id: ModuleId, is_static: bool, names: &[String]) {
        if names.is_empty() {
            return;
        }
        // the offline index only knows static ids
        if is_static {
            self.known_mask.insert(id);
        } else {
            self.recorders.push(MatchRecorder::ForType {
                id,
                matcher: TypeMatcher::named_one_of(names.iter().cloned()),
            });
        }
    }

    fn build_type_advice(&mut self, module: &ModuleDescriptor) -> TransformStack {
        let mut steps = Vec::new();

        if !module.helpers.is_empty() {
            steps.push(TransformStep::InjectHelpers(module.helpers.clone()));
        }

        if module.has_context_store() {
            steps.push(TransformStep::RewriteContextAccess(
                module.context_store.clone(),
            ));
            if self.runtime_context_injection {
                self.register_context_store_injection(module);
            }
        }

        steps.extend(module.transforms.iter().cloned().map(TransformStep::Custom));

        steps.extend(module.advice.iter().map(|binding| TransformStep::Advice {
            methods: binding.methods.clone(),
            ignore: module.method_ignore.clone(),
            advice_class: binding.advice_class.clone(),
        }));

        TransformStack::new(module.name.clone(), steps)
    }

    fn register_context_store_injection(&mut self, module: &ModuleDescriptor) {
        let activation = if module.flags.contains(ModuleFlags::FOR_BOOTSTRAP) {
            LoaderMatcher::Any
        } else {
            match &module.strategy {
                MatchStrategy::Hierarchy {
                    marker: Some(marker),
                    ..
                }
                | MatchStrategy::Shortcut {
                    marker: Some(marker),
                    ..
                } => LoaderMatcher::has_class_named(marker.clone()),
                MatchStrategy::SingleType(name) => LoaderMatcher::has_class_named(name.clone()),
                MatchStrategy::KnownTypes(names) => {
                    LoaderMatcher::has_class_named_one_of(names.iter().cloned())
                }
                _ => LoaderMatcher::Any,
            }
        };
        let activation = LoaderMatcher::require_both(activation, module.loader_matcher.clone());

        for (key, value) in &module.context_store {
            let existing = self
                .context_stores
                .iter_mut()
                .find(|store| store.key == *key && store.value == *value);
            match existing {
                Some(store) => {
                    let merged = std::mem::replace(&mut store.activation, LoaderMatcher::Any);
                    store.activation = if merged.is_any() || activation.is_any() {
                        LoaderMatcher::Any
                    } else {
                        merged.or(activation.clone())
                    };
                }
                None => self.context_stores.push(ContextStoreInjection {
                    key: key.clone(),
                    value: value.clone(),
                    activation: activation.clone(),
                }),
            }
        }
    }

    /// Allocate the context-store injectors and assemble the pipeline.
    #[must_use]
    pub fn build(mut self) -> CombiningPipeline {
        let stores = std::mem::take(&mut self.context_stores);
        for store in stores {
            let id = self.allocate_dynamic();
            self.recorders.push(MatchRecorder::ForContextStore {
                id,
                activation: store.activation,
                matcher: TypeMatcher::IsInterface
                    .not()
                    .and(TypeMatcher::has_super_type(store.key.clone())),
            });
            self.table.set(
                id,
                TransformStack::new(
                    format!("{}->{}", store.key, store.value),
                    vec![TransformStep::InjectContextField {
                        key: store.key.clone(),
                        value: store.value.clone(),
                    }],
                ),
            );
            self.modules.push(InstalledModule {
                id,
                name: format!("{}->{}", store.key, store.value),
                kind: InstalledKind::ContextStore {
                    key: store.key,
                    value: store.value,
                },
            });
        }
        self.modules.sort_by_key(|m| m.id);

        let matcher = CombiningMatcher::new(
            Arc::new(self.index.known_types().clone()),
            self.known_mask,
            self.recorders,
            self.hints.clone(),
            self.deferral,
        );
        let transformer = SplittingTransformer::new(Arc::new(self.table), self.status);

        CombiningPipeline {
            matcher: Arc::new(matcher),
            transformer: Arc::new(transformer),
            modules: self.modules,
            caches: MatcherCaches {
                hints: self.hints,
                muzzles: self.muzzles,
            },
        }
    }
}
