//! Host runtime boundary.
//!
//! The matching and transformation core never talks to a virtual machine directly. Everything
//! it needs from the managed runtime is expressed by the small set of traits in this module:
//!
//! - [`ClassLoader`] - identity, class name and class visibility of a defining loader
//! - [`ClassFileTransformer`] - the per-definition callback the runtime invokes
//! - [`Instrumentation`] - transformer registration, class enumeration and retransformation
//! - [`BytecodeEngine`] - the opaque engine that parses class bytes into a
//!   [`crate::matcher::ClassDescriptor`] and renders accumulated edits back into bytes
//!
//! The bootstrap loader is represented by `None` wherever an `Option<&LoaderRef>` appears.
//!
//! [`memory::InMemoryRuntime`] implements both [`Instrumentation`] and [`BytecodeEngine`]
//! entirely in process, which is what the test suite and the benchmarks drive.

pub mod memory;

use std::{fmt, sync::Arc};

use crate::{matcher::ClassDescriptor, transform::ClassBuilder, Result};

/// Stable identity of a class loader for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader@{:x}", self.0)
    }
}

/// A defining class loader as seen by the matcher.
pub trait ClassLoader: Send + Sync + fmt::Debug {
    /// Stable identity, used as cache key by hint and muzzle caches.
    fn id(&self) -> LoaderId;

    /// Binary name of the loader's own class, e.g. `sun.misc.Launcher$AppClassLoader`.
    fn class_name(&self) -> &str;

    /// Whether `class_name` is visible through this loader.
    ///
    /// Implementations may be expensive (resource lookups); callers memoise the answer.
    fn has_class(&self, class_name: &str) -> bool;
}

/// Shared handle to a class loader.
pub type LoaderRef = Arc<dyn ClassLoader>;

/// A class currently loaded in the runtime, as reported by
/// [`Instrumentation::loaded_classes`].
#[derive(Debug, Clone)]
pub struct LoadedClass {
    /// Parsed view of the class.
    pub descriptor: Arc<ClassDescriptor>,
    /// Defining loader, `None` for the bootstrap loader.
    pub loader: Option<LoaderRef>,
}

impl LoadedClass {
    /// Binary name of the class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// One class definition or redefinition attempt delivered to a [`ClassFileTransformer`].
#[derive(Debug, Clone)]
pub struct ClassLoadEvent {
    /// Binary name of the class being defined.
    pub class_name: String,
    /// Defining loader, `None` for the bootstrap loader.
    pub loader: Option<LoaderRef>,
    /// The class being redefined, `None` for an initial definition.
    pub redefining: Option<LoadedClass>,
    /// Current class file bytes.
    pub bytes: Vec<u8>,
}

impl ClassLoadEvent {
    /// Creates an event for an initial definition.
    #[must_use]
    pub fn define(class_name: impl Into<String>, loader: Option<LoaderRef>, bytes: Vec<u8>) -> Self {
        Self {
            class_name: class_name.into(),
            loader,
            redefining: None,
            bytes,
        }
    }

    /// Creates an event for a redefinition of an already loaded class.
    #[must_use]
    pub fn redefine(class: LoadedClass, bytes: Vec<u8>) -> Self {
        Self {
            class_name: class.name().to_string(),
            loader: class.loader.clone(),
            redefining: Some(class),
            bytes,
        }
    }

    /// Returns `true` for explicit retransformation requests.
    #[must_use]
    pub fn is_redefinition(&self) -> bool {
        self.redefining.is_some()
    }
}

/// Callback invoked by the runtime once per class definition or redefinition attempt.
///
/// Returning `Ok(None)` leaves the class as it is. Returning `Err` engages the runtime's own
/// error path for that definition.
pub trait ClassFileTransformer: Send + Sync {
    /// Transform one class definition.
    ///
    /// # Errors
    ///
    /// Returns an error only when the class cannot be left in a consistent state.
    fn transform(&self, event: &ClassLoadEvent) -> Result<Option<Vec<u8>>>;
}

/// The runtime's instrumentation facility.
pub trait Instrumentation: Send + Sync {
    /// Register a transformer; transformers run in registration order.
    fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>);

    /// Snapshot of every class currently loaded.
    fn loaded_classes(&self) -> Vec<LoadedClass>;

    /// Whether the runtime allows `class` to be retransformed.
    fn is_modifiable(&self, class: &LoadedClass) -> bool;

    /// Request retransformation of `classes` as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Retransform`] if the runtime rejects the batch.
    fn retransform(&self, classes: &[LoadedClass]) -> Result<()>;
}

/// The bytecode engine the core delegates class parsing and rendering to.
pub trait BytecodeEngine: Send + Sync {
    /// Parse the event's class bytes into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be parsed or the type pool cannot resolve it.
    fn describe(&self, event: &ClassLoadEvent) -> Result<ClassDescriptor>;

    /// Render the edits accumulated in `builder` on top of the event's bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the edits produce an invalid class.
    fn materialize(&self, event: &ClassLoadEvent, builder: &ClassBuilder) -> Result<Vec<u8>>;
}
