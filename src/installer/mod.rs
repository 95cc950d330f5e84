//! Wiring modules into a host runtime.
//!
//! The [`CombiningTransformerBuilder`] turns module descriptors into one
//! [`CombiningPipeline`]: a shared matcher plus the per-id transform stacks. The
//! [`AgentInstaller`] then deploys the pipeline according to the configured
//! [`crate::InstallStrategy`]:
//!
//! - **Combining**: a single [`CombiningTransformer`] evaluates every module in one pass per
//!   class and applies all matched stacks to one class builder.
//! - **Legacy**: one [`LegacyTransformer`] per id, each running its own pass. Slower, but it
//!   shares the recorders and stacks of the combined pipeline, so both strategies produce
//!   the same class bytes.
//!
//! The returned [`AgentHandle`] exposes per-module status and the deferred-matching state,
//! and owns the background threads (deferral timer, periodic cache reset).

mod agent;
mod combining;
mod legacy;

pub use agent::{AgentHandle, AgentInstaller, CombiningTransformer, RESET_THREAD_NAME};
pub use combining::{
    CombiningPipeline, CombiningTransformerBuilder, InstalledKind, InstalledModule,
    MatcherCaches,
};
pub use legacy::LegacyTransformer;
