//! In-process host runtime.
//!
//! [`InMemoryRuntime`] plays both host roles, [`Instrumentation`] and [`BytecodeEngine`],
//! without a virtual machine behind it. Classes are registered as
//! [`crate::matcher::ClassDescriptor`]s; their "class bytes" are a small text rendering
//! (`class <name>` followed by one line per applied [`crate::transform::ClassEdit`]), which
//! makes the outcome of a definition easy to inspect and to compare across deployment
//! strategies.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classweave::host::memory::{InMemoryRuntime, SimpleLoader};
//! use classweave::host::{LoaderId, LoaderRef};
//! use classweave::matcher::ClassDescriptor;
//!
//! let runtime = InMemoryRuntime::new();
//! let loader: LoaderRef = Arc::new(SimpleLoader::new(LoaderId(1), "some.AppLoader"));
//!
//! let bytes = runtime.define(ClassDescriptor::new("com.foo.Bar"), Some(loader.clone()))?;
//! assert_eq!(bytes, b"class com.foo.Bar\n");
//! assert_eq!(runtime.loaded_count(), 1);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use dashmap::DashMap;

use crate::{
    host::{
        BytecodeEngine, ClassFileTransformer, ClassLoadEvent, ClassLoader, Instrumentation,
        LoadedClass, LoaderId, LoaderRef,
    },
    matcher::ClassDescriptor,
    transform::ClassBuilder,
    Error, Result,
};

/// A class loader with a fixed set of visible classes.
#[derive(Debug, Clone)]
pub struct SimpleLoader {
    id: LoaderId,
    class_name: String,
    classes: HashSet<String>,
}

impl SimpleLoader {
    /// Creates a loader that sees no classes.
    #[must_use]
    pub fn new(id: LoaderId, class_name: impl Into<String>) -> Self {
        Self {
            id,
            class_name: class_name.into(),
            classes: HashSet::new(),
        }
    }

    /// Make `classes` visible through this loader.
    #[must_use]
    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes.extend(classes.into_iter().map(Into::into));
        self
    }
}

impl ClassLoader for SimpleLoader {
    fn id(&self) -> LoaderId {
        self.id
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn has_class(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }
}

type DefinitionKey = (String, Option<LoaderId>);

fn key(class_name: &str, loader: Option<&LoaderRef>) -> DefinitionKey {
    (class_name.to_string(), loader.map(|l| l.id()))
}

/// Initial class bytes of `class_name` in the in-memory rendering.
#[must_use]
pub fn original_bytes(class_name: &str) -> Vec<u8> {
    format!("class {class_name}\n").into_bytes()
}

/// An in-process runtime implementing [`Instrumentation`] and [`BytecodeEngine`].
#[derive(Default)]
pub struct InMemoryRuntime {
    pool: DashMap<String, ClassDescriptor>,
    transformers: RwLock<Vec<Arc<dyn ClassFileTransformer>>>,
    loaded: DashMap<DefinitionKey, LoadedClass>,
    definitions: DashMap<DefinitionKey, Vec<u8>>,
    unmodifiable: DashMap<String, ()>,
    batches: Mutex<Vec<Vec<String>>>,
    reject_retransform: AtomicBool,
}

impl InMemoryRuntime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `class` on `loader`, running every registered transformer.
    ///
    /// Returns the final class bytes.
    ///
    /// # Errors
    ///
    /// Propagates the first transformer error; the class is then not defined.
    pub fn define(&self, class: ClassDescriptor, loader: Option<LoaderRef>) -> Result<Vec<u8>> {
        let name = class.name.clone();
        self.pool.insert(name.clone(), class.clone());

        let event = ClassLoadEvent::define(name.clone(), loader.clone(), original_bytes(&name));
        let bytes = self.run_transformers(event)?;

        let key = key(&name, loader.as_ref());
        self.loaded.insert(
            key.clone(),
            LoadedClass {
                descriptor: Arc::new(class),
                loader,
            },
        );
        self.definitions.insert(key, bytes.clone());
        Ok(bytes)
    }

    fn run_transformers(&self, mut event: ClassLoadEvent) -> Result<Vec<u8>> {
        let transformers = self
            .transformers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for transformer in transformers {
            if let Some(bytes) = transformer.transform(&event)? {
                event.bytes = bytes;
            }
        }
        Ok(event.bytes)
    }

    /// Current bytes of `class_name` as defined on `loader`.
    #[must_use]
    pub fn definition(&self, class_name: &str, loader: Option<&LoaderRef>) -> Option<Vec<u8>> {
        self.definitions
            .get(&key(class_name, loader))
            .map(|bytes| bytes.clone())
    }

    /// Rendered edits applied to `class_name` on `loader`, in application order.
    #[must_use]
    pub fn edits(&self, class_name: &str, loader: Option<&LoaderRef>) -> Vec<String> {
        self.definition(class_name, loader)
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .lines()
                    .skip(1)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark `class_name` as (un)modifiable for retransformation.
    pub fn set_modifiable(&self, class_name: &str, modifiable: bool) {
        if modifiable {
            self.unmodifiable.remove(class_name);
        } else {
            self.unmodifiable.insert(class_name.to_string(), ());
        }
    }

    /// Make every following retransformation request fail.
    pub fn reject_retransform(&self, reject: bool) {
        self.reject_retransform.store(reject, Ordering::SeqCst);
    }

    /// Class names of every accepted retransformation batch, in request order.
    #[must_use]
    pub fn retransform_batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered transformers.
    #[must_use]
    pub fn transformer_count(&self) -> usize {
        self.transformers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of loaded classes.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

impl Instrumentation for InMemoryRuntime {
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>) {
        self.transformers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transformer);
    }

    fn loaded_classes(&self) -> Vec<LoadedClass> {
        let mut classes: Vec<LoadedClass> =
            self.loaded.iter().map(|entry| entry.value().clone()).collect();
        classes.sort_by(|a, b| {
            (a.name(), a.loader.as_ref().map(|l| l.id()))
                .cmp(&(b.name(), b.loader.as_ref().map(|l| l.id())))
        });
        classes
    }

    fn is_modifiable(&self, class: &LoadedClass) -> bool {
        !self.unmodifiable.contains_key(class.name())
    }

    fn retransform(&self, classes: &[LoadedClass]) -> Result<()> {
        if self.reject_retransform.load(Ordering::SeqCst) {
            return Err(Error::Retransform(format!(
                "{} classes rejected by the runtime",
                classes.len()
            )));
        }
        if let Some(class) = classes.iter().find(|class| !self.is_modifiable(class)) {
            return Err(Error::Retransform(format!(
                "{} is not modifiable",
                class.name()
            )));
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(classes.iter().map(|c| c.name().to_string()).collect());

        for class in classes {
            let key = key(class.name(), class.loader.as_ref());
            let event = ClassLoadEvent::redefine(class.clone(), original_bytes(class.name()));
            let bytes = self.run_transformers(event)?;
            self.definitions.insert(key, bytes);
        }
        Ok(())
    }
}

impl BytecodeEngine for InMemoryRuntime {
    fn describe(&self, event: &ClassLoadEvent) -> Result<ClassDescriptor> {
        if let Some(class) = &event.redefining {
            return Ok(class.descriptor.as_ref().clone());
        }
        self.pool
            .get(&event.class_name)
            .map(|class| class.clone())
            .ok_or_else(|| Error::Host(format!("{} is not in the type pool", event.class_name)))
    }

    fn materialize(&self, event: &ClassLoadEvent, builder: &ClassBuilder) -> Result<Vec<u8>> {
        let mut bytes = event.bytes.clone();
        for edit in builder.edits() {
            bytes.extend_from_slice(edit.to_string().as_bytes());
            bytes.push(b'\n');
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ClassEdit;

    struct Tagging(&'static str);

    impl ClassFileTransformer for Tagging {
        fn transform(&self, event: &ClassLoadEvent) -> Result<Option<Vec<u8>>> {
            let mut bytes = event.bytes.clone();
            bytes.extend_from_slice(format!("{}\n", self.0).as_bytes());
            Ok(Some(bytes))
        }
    }

    struct Failing;

    impl ClassFileTransformer for Failing {
        fn transform(&self, _event: &ClassLoadEvent) -> Result<Option<Vec<u8>>> {
            Err(Error::Host("verify error".into()))
        }
    }

    #[test]
    fn transformers_chain_in_registration_order() {
        let runtime = InMemoryRuntime::new();
        runtime.add_transformer(Arc::new(Tagging("first")));
        runtime.add_transformer(Arc::new(Tagging("second")));

        runtime.define(ClassDescriptor::new("a.B"), None).unwrap();
        assert_eq!(runtime.edits("a.B", None), vec!["first", "second"]);
        assert_eq!(runtime.transformer_count(), 2);
    }

    #[test]
    fn failing_transformer_prevents_definition() {
        let runtime = InMemoryRuntime::new();
        runtime.add_transformer(Arc::new(Failing));
        assert!(runtime.define(ClassDescriptor::new("a.B"), None).is_err());
        assert_eq!(runtime.loaded_count(), 0);
    }

    #[test]
    fn definitions_are_per_loader() {
        let runtime = InMemoryRuntime::new();
        let one: LoaderRef = Arc::new(SimpleLoader::new(LoaderId(1), "L"));
        let two: LoaderRef = Arc::new(SimpleLoader::new(LoaderId(2), "L"));

        runtime.define(ClassDescriptor::new("a.B"), Some(one.clone())).unwrap();
        runtime.define(ClassDescriptor::new("a.B"), Some(two.clone())).unwrap();
        assert_eq!(runtime.loaded_count(), 2);
        assert!(runtime.definition("a.B", Some(&one)).is_some());
        assert!(runtime.definition("a.B", None).is_none());
    }

    #[test]
    fn retransform_batches_and_rejection() {
        let runtime = InMemoryRuntime::new();
        runtime.define(ClassDescriptor::new("a.B"), None).unwrap();
        runtime.add_transformer(Arc::new(Tagging("late")));

        let classes = runtime.loaded_classes();
        runtime.retransform(&classes).unwrap();
        assert_eq!(runtime.retransform_batches(), vec![vec!["a.B".to_string()]]);
        assert_eq!(runtime.edits("a.B", None), vec!["late"]);

        runtime.set_modifiable("a.B", false);
        assert!(!runtime.is_modifiable(&classes[0]));
        assert!(matches!(
            runtime.retransform(&classes),
            Err(Error::Retransform(_))
        ));

        runtime.set_modifiable("a.B", true);
        runtime.reject_retransform(true);
        assert!(runtime.retransform(&classes).is_err());
        assert_eq!(runtime.retransform_batches().len(), 1);
    }

    #[test]
    fn materialize_appends_edits() {
        let runtime = InMemoryRuntime::new();
        let event = ClassLoadEvent::define("a.B", None, original_bytes("a.B"));
        let mut builder = ClassBuilder::new("a.B");
        builder.push(ClassEdit::InjectContextField {
            key: "a.B".into(),
            value: "x.V".into(),
        });

        let bytes = runtime.materialize(&event, &builder).unwrap();
        assert_eq!(bytes, b"class a.B\ncontext-field a.B->x.V\n");
        assert!(runtime.describe(&event).is_err());
    }
}
