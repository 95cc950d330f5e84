use dashmap::DashMap;

use crate::module::ModuleId;

/// Counters tracked for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleStatus {
    /// Classes the module's transform stack was applied to.
    pub applied: u64,
    /// Classes for which the transform stack failed and was rolled back.
    pub failed: u64,
    /// Loaders rejected by the module's muzzle check.
    pub muzzled: u64,
    /// Message of the most recent failure.
    pub last_failure: Option<String>,
}

/// Per-module instrumentation outcomes.
///
/// Transform failures never propagate into application code; they are attributed to the
/// failing module here so that operators can see which module misbehaves. Updates come from
/// arbitrary class-loading threads concurrently.
#[derive(Debug, Default)]
pub struct InstrumentationStatus {
    modules: DashMap<ModuleId, ModuleStatus>,
}

impl InstrumentationStatus {
    /// Creates an empty status table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful application.
    pub fn record_applied(&self, id: ModuleId) {
        self.modules.entry(id).or_default().applied += 1;
    }

    /// Count a failed application and remember its message.
    pub fn record_failure(&self, id: ModuleId, message: impl Into<String>) {
        let mut entry = self.modules.entry(id).or_default();
        entry.failed += 1;
        entry.last_failure = Some(message.into());
    }

    /// Count a muzzle rejection.
    pub fn record_muzzled(&self, id: ModuleId) {
        self.modules.entry(id).or_default().muzzled += 1;
    }

    /// Snapshot of the counters for `id`.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<ModuleStatus> {
        self.modules.get(&id).map(|entry| entry.clone())
    }

    /// Snapshot of every module with recorded activity, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ModuleId, ModuleStatus)> {
        let mut all: Vec<_> = self
            .modules
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}
