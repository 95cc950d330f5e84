use std::collections::HashMap;

use crate::{matcher::MatchSet, module::ModuleId};

/// Ahead-of-time mapping from binary class name to the modules that name alone selects.
///
/// Modules whose strategy reduces to a finite list of class names never run a predicate for
/// their primary match: the combining matcher looks the class up here once and ORs the
/// resulting ids into the match set before any recorder runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownTypesIndex {
    types: HashMap<String, MatchSet>,
}

impl KnownTypesIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `class_name` selects module `id`.
    pub fn insert(&mut self, class_name: impl Into<String>, id: ModuleId) {
        self.types.entry(class_name.into()).or_default().insert(id);
    }

    /// Modules selected by `class_name`.
    #[must_use]
    pub fn lookup(&self, class_name: &str) -> Option<&MatchSet> {
        self.types.get(class_name)
    }

    /// Every class name that selects `id`, sorted.
    #[must_use]
    pub fn names_for(&self, id: ModuleId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .types
            .iter()
            .filter(|(_, ids)| ids.contains(id))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Iterate over `(class name, ids)` entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatchSet)> {
        self.types.iter().map(|(name, ids)| (name.as_str(), ids))
    }

    /// Number of indexed class names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no class name is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
