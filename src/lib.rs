// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # classweave
//!
//! The matching and transformation core of a class-load time bytecode instrumentation agent.
//!
//! An agent carries hundreds of instrumentation modules, each describing which classes it
//! applies to and how it rewrites them. Asking every module about every loaded class, one
//! transformer per module, is what makes naive agents slow to start. `classweave` instead
//! evaluates all modules in a single pass per class, recording the matching module ids in a
//! bitset, then replays only the matched modules' transforms against one class builder.
//!
//! ## Features
//!
//! - **Combining matcher** - one pass per class over every module, with a known-types
//!   index for modules that enumerate their target types
//! - **Splitting transformer** - per-module transform stacks applied in ascending id order,
//!   with failures rolled back and attributed to the failing module only
//! - **Deferred matching** - skip matching for chosen class loaders during startup, then
//!   retransform the classes that would have matched in one batch
//! - **Context stores** - dedicated injector modules adding per-instance storage fields to
//!   the key types that modules attach state to
//! - **Legacy strategy** - one transformer per module, producing identical class bytes
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classweave::prelude::*;
//!
//! let modules = vec![
//!     ModuleDescriptor::new(
//!         "servlet",
//!         MatchStrategy::Hierarchy {
//!             marker: None,
//!             matcher: TypeMatcher::has_super_type("javax.servlet.Servlet"),
//!         },
//!     )
//!     .advice(MethodMatcher::named("service"), "com.acme.ServletAdvice"),
//! ];
//! let index = Arc::new(ModuleIndex::build(&modules)?);
//! let runtime = Arc::new(InMemoryRuntime::new());
//!
//! let handle = AgentInstaller::new(AgentConfig::default()).install(
//!     runtime.clone(),
//!     runtime.clone(),
//!     index,
//!     &modules,
//! )?;
//!
//! let servlet = ClassDescriptor::new("com.acme.Home")
//!     .extends("javax.servlet.Servlet")
//!     .method(MethodDescriptor::new("service", "()V"));
//! runtime.define(servlet, None)?;
//!
//! assert_eq!(
//!     runtime.edits("com.acme.Home", None),
//!     vec!["advice[servlet] service()V com.acme.ServletAdvice"]
//! );
//! assert_eq!(handle.status().get(ModuleId::new(0)).map(|s| s.applied), Some(1));
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`module`] - module descriptors, ids and the ahead-of-time [`module::ModuleIndex`]
//! - [`matcher`] - element matchers, recorders and the [`matcher::CombiningMatcher`]
//! - [`transform`] - transform stacks and the [`transform::SplittingTransformer`]
//! - [`installer`] - pipeline assembly and deployment into a host
//! - [`host`] - the host runtime seam, with an in-memory implementation
//! - [`config`] - agent configuration from properties or the environment
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: registration failures at `error`, transform
//! failures at `warn`, lifecycle events at `info`, and recorder failures and cache activity
//! at `debug`. Install any `log` backend to see them.

#[macro_use]
pub(crate) mod error;

/// Agent configuration.
///
/// [`AgentConfig`] collects every setting the installer honours, loaded from dotted property
/// keys or `CLASSWEAVE_*` environment variables.
pub mod config;

/// The host runtime seam.
///
/// The traits in this module abstract the virtual machine the agent is attached to: class
/// loaders, the instrumentation service accepting transformers and retransformation
/// requests, and the bytecode engine that describes and rewrites class files. The
/// [`host::memory`] module provides an in-memory runtime used by tests and examples.
pub mod host;

/// Module wiring: the combining builder, the installer and the legacy strategy.
pub mod installer;

/// Element matchers, match recorders and the combining matcher.
pub mod matcher;

/// Instrumentation module descriptors, ids, the module index and muzzle checks.
pub mod module;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use classweave::prelude::*;
///
/// let config = AgentConfig::default().with_strategy(InstallStrategy::Legacy);
/// assert_eq!(config.strategy, InstallStrategy::Legacy);
/// ```
pub mod prelude;

/// Transform stacks, the class builder and the splitting transformer.
pub mod transform;

/// Binary encoding helpers.
pub mod utils;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Agent configuration and deployment strategy.
pub use config::{AgentConfig, InstallStrategy};
