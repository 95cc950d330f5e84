use std::sync::Arc;

use dashmap::DashMap;
use log::debug;

use crate::{
    host::{LoaderId, LoaderRef},
    module::{InstrumentationStatus, ModuleId},
};

/// Safety check that a module's expected API surface is present in the target loader.
///
/// A module declares the class names its advice references. Before its transform is allowed
/// to apply to a class, every referenced class must resolve through the defining loader;
/// otherwise the advice would link against missing types at runtime. The answer is cached per
/// loader since it only depends on what the loader can see.
///
/// The combining builder appends this check as the last refinement recorder of every module,
/// so the expensive lookup only runs for classes that already matched cheaper predicates.
///
/// At most `capacity` loader verdicts are kept; recording one more starts the cache over.
#[derive(Debug)]
pub struct MuzzleCheck {
    id: ModuleId,
    module: String,
    references: Vec<String>,
    verdicts: DashMap<LoaderId, bool>,
    capacity: usize,
    status: Option<Arc<InstrumentationStatus>>,
}

impl MuzzleCheck {
    /// Loader verdicts kept per module by default.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a check for module `module` with the given class references.
    #[must_use]
    pub fn new(id: ModuleId, module: impl Into<String>, references: Vec<String>) -> Self {
        Self {
            id,
            module: module.into(),
            references,
            verdicts: DashMap::new(),
            capacity: Self::DEFAULT_CAPACITY,
            status: None,
        }
    }

    /// Keep at most `capacity` loader verdicts.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of cached loader verdicts.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.verdicts.len()
    }

    /// Report rejected loaders to `status`.
    #[must_use]
    pub fn with_status(mut self, status: Arc<InstrumentationStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Name of the guarded module.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Class names that must resolve.
    #[must_use]
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Whether every reference resolves through `loader`. The bootstrap loader always passes.
    pub fn matches(&self, loader: Option<&LoaderRef>) -> bool {
        let Some(loader) = loader else {
            return true;
        };
        if self.references.is_empty() {
            return true;
        }

        if let Some(verdict) = self.verdicts.get(&loader.id()) {
            return *verdict;
        }

        let missing: Vec<&str> = self
            .references
            .iter()
            .filter(|reference| !loader.has_class(reference))
            .map(String::as_str)
            .collect();
        let verdict = missing.is_empty();
        if !verdict {
            debug!(
                "Muzzled - {} instrumentation.target.classloader={} missing={}",
                self.module,
                loader.class_name(),
                missing.join(",")
            );
            if let Some(status) = &self.status {
                status.record_muzzled(self.id);
            }
        }

        if self.verdicts.len() >= self.capacity {
            self.verdicts.clear();
        }
        self.verdicts.insert(loader.id(), verdict);
        verdict
    }

    /// Forget every cached verdict.
    pub fn reset(&self) {
        self.verdicts.clear();
    }
}
