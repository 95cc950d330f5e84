use dashmap::DashMap;

use crate::host::{LoaderId, LoaderRef};

/// Memoised class-visibility lookups per class loader.
///
/// Hierarchy hints and context-store activations ask "does this loader expose marker type X?"
/// for every class a loader defines. The answer does not change for the lifetime of the
/// loader, so it is cached here keyed by `(loader id, class name)`.
///
/// Loaders come and go (one per deployment, JSP or bundle) and their ids are never reused, so
/// the cache holds at most `capacity` answers: inserting past the limit drops every cached
/// answer first. The agent additionally clears it periodically when a reset interval is
/// configured.
#[derive(Debug)]
pub struct HintCache {
    visible: DashMap<(LoaderId, String), bool>,
    capacity: usize,
}

impl Default for HintCache {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl HintCache {
    /// Answers kept by [`HintCache::new`] before the cache starts over.
    pub const DEFAULT_CAPACITY: usize = 8192;

    /// Creates an empty cache holding up to [`HintCache::DEFAULT_CAPACITY`] answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache holding up to `capacity` answers.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            visible: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of cached answers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `class_name` is visible through `loader`, asking the loader on a cache miss.
    pub fn has_class(&self, loader: &LoaderRef, class_name: &str) -> bool {
        let key = (loader.id(), class_name.to_string());
        if let Some(hit) = self.visible.get(&key) {
            return *hit;
        }

        let visible = loader.has_class(class_name);
        if self.visible.len() >= self.capacity {
            self.visible.clear();
        }
        self.visible.insert(key, visible);
        visible
    }

    /// Number of cached answers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Drops every cached answer.
    pub fn reset(&self) {
        self.visible.clear();
    }
}
