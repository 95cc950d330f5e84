//! # classweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classweave library. Import this module to get quick access to the essential
//! types for declaring modules and installing them into a host.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

/// Agent configuration and deployment strategy
pub use crate::{AgentConfig, InstallStrategy};

// ================================================================================================
// Module Declaration
// ================================================================================================

/// Module descriptors and their match strategies
pub use crate::module::{
    AdviceBinding, MatchStrategy, ModuleDescriptor, ModuleFlags, ModuleId, TargetSystem,
};

/// Ahead-of-time module registry
pub use crate::module::ModuleIndex;

/// Per-module outcome counters
pub use crate::module::{InstrumentationStatus, ModuleStatus};

// ================================================================================================
// Matching
// ================================================================================================

/// Element matchers for types, class loaders and methods
pub use crate::matcher::{LoaderMatcher, MethodMatcher, TypeMatcher};

/// Class and method shapes seen by matchers
pub use crate::matcher::{ClassDescriptor, MethodDescriptor};

/// The combined matcher and its match results
pub use crate::matcher::{CombiningMatcher, MatchContext, MatchSet, MatchingState};

// ================================================================================================
// Transformation
// ================================================================================================

/// Class edits and module-supplied transforms
pub use crate::transform::{ClassBuilder, ClassEdit, CustomTransform};

// ================================================================================================
// Installation and Host
// ================================================================================================

/// Installer entry points
pub use crate::installer::{AgentHandle, AgentInstaller, CombiningTransformerBuilder};

/// Host runtime traits
pub use crate::host::{
    BytecodeEngine, ClassFileTransformer, ClassLoader, ClassLoadEvent, Instrumentation,
    LoadedClass, LoaderId, LoaderRef,
};

/// In-memory host runtime
pub use crate::host::memory::{InMemoryRuntime, SimpleLoader};
