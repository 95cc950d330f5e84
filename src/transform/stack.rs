use std::{fmt, sync::Arc};

use crate::{
    host::LoaderRef,
    matcher::{ClassDescriptor, MethodMatcher},
    module::ModuleId,
    transform::{ClassBuilder, ClassEdit},
    Result,
};

/// Closure type behind [`CustomTransform`].
pub type CustomTransformFn =
    dyn Fn(&mut ClassBuilder, &ClassDescriptor, Option<&LoaderRef>) -> Result<()> + Send + Sync;

/// A named, module-supplied type transform.
#[derive(Clone)]
pub struct CustomTransform {
    name: String,
    transform: Arc<CustomTransformFn>,
}

impl CustomTransform {
    /// Wrap `transform` under `name`.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&mut ClassBuilder, &ClassDescriptor, Option<&LoaderRef>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Name shown in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the transform.
    ///
    /// # Errors
    ///
    /// Propagates the transform's failure.
    pub fn apply(
        &self,
        builder: &mut ClassBuilder,
        class: &ClassDescriptor,
        loader: Option<&LoaderRef>,
    ) -> Result<()> {
        (self.transform)(builder, class, loader)
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTransform")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One step of a module's transformation.
#[derive(Debug, Clone)]
pub enum TransformStep {
    /// Inject helper classes.
    InjectHelpers(Vec<String>),
    /// Rewrite context-store access to injected fields.
    RewriteContextAccess(Vec<(String, String)>),
    /// Add one context-store field.
    InjectContextField {
        /// Key type.
        key: String,
        /// Value type.
        value: String,
    },
    /// Module-supplied transform.
    Custom(CustomTransform),
    /// Apply `advice_class` to every declared method selected by `methods` and not
    /// excluded by `ignore`.
    Advice {
        /// Target methods.
        methods: MethodMatcher,
        /// Methods never advised.
        ignore: MethodMatcher,
        /// Advice class.
        advice_class: String,
    },
}

impl TransformStep {
    fn apply(
        &self,
        module: &str,
        builder: &mut ClassBuilder,
        class: &ClassDescriptor,
        loader: Option<&LoaderRef>,
    ) -> Result<()> {
        match self {
            TransformStep::InjectHelpers(helpers) => builder.push(ClassEdit::InjectHelpers {
                module: module.to_string(),
                helpers: helpers.clone(),
            }),
            TransformStep::RewriteContextAccess(stores) => {
                builder.push(ClassEdit::RewriteContextAccess {
                    module: module.to_string(),
                    stores: stores.clone(),
                });
            }
            TransformStep::InjectContextField { key, value } => {
                builder.push(ClassEdit::InjectContextField {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            TransformStep::Custom(transform) => transform.apply(builder, class, loader)?,
            TransformStep::Advice {
                methods,
                ignore,
                advice_class,
            } => {
                for method in &class.methods {
                    if methods.matches(method)? && !ignore.matches(method)? {
                        builder.push(ClassEdit::Advice {
                            module: module.to_string(),
                            method: method.to_string(),
                            advice_class: advice_class.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Ordered transform steps of one module. Immutable once built.
#[derive(Debug, Clone)]
pub struct TransformStack {
    module: String,
    steps: Vec<TransformStep>,
}

impl TransformStack {
    /// Creates a stack for `module`.
    #[must_use]
    pub fn new(module: impl Into<String>, steps: Vec<TransformStep>) -> Self {
        Self {
            module: module.into(),
            steps,
        }
    }

    /// Owning module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Steps in application order.
    #[must_use]
    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    /// Apply every step to `builder`.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing step. Edits made by earlier steps remain in
    /// the builder; callers roll back to a checkpoint.
    pub fn apply(
        &self,
        builder: &mut ClassBuilder,
        class: &ClassDescriptor,
        loader: Option<&LoaderRef>,
    ) -> Result<()> {
        for step in &self.steps {
            step.apply(&self.module, builder, class, loader)?;
        }
        Ok(())
    }
}

/// Transform stacks indexed by [`ModuleId`].
///
/// Slots grow on demand so supplementary ids allocated above the static range can be
/// populated after the static ones; existing ids stay valid.
#[derive(Debug, Clone, Default)]
pub struct TransformerTable {
    stacks: Vec<Option<Arc<TransformStack>>>,
}

impl TransformerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with `len` empty slots.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            stacks: vec![None; len],
        }
    }

    /// Store `stack` under `id`, growing the table if needed.
    pub fn set(&mut self, id: ModuleId, stack: TransformStack) {
        let index = id.index();
        if index >= self.stacks.len() {
            self.stacks.resize(index + 1, None);
        }
        self.stacks[index] = Some(Arc::new(stack));
    }

    /// Stack stored under `id`.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Arc<TransformStack>> {
        self.stacks.get(id.index()).and_then(Option::as_ref)
    }

    /// Whether a stack is stored under `id`.
    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.get(id).is_some()
    }

    /// Number of slots, populated or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Returns `true` if the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Populated ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.stacks
            .iter()
            .enumerate()
            .filter(|(_, stack)| stack.is_some())
            .map(|(index, _)| ModuleId::from_index(index))
    }
}
