//! Transform stacks and the splitting transformer.
//!
//! Every registered module owns one [`TransformStack`], stored in the [`TransformerTable`]
//! under its [`crate::module::ModuleId`]. Once the combining matcher has produced the
//! [`crate::matcher::MatchSet`] for a class, the [`SplittingTransformer`] replays the stacks
//! of exactly the matched modules, lowest id first, threading one [`ClassBuilder`] through
//! all of them. Ascending id order is what lets independently written modules compose
//! predictably: context-store injectors are allocated ids above every ordinary module, so
//! the fields they add are always introduced after the modules that rewrite access to them.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classweave::matcher::{ClassDescriptor, MatchSet};
//! use classweave::module::{InstrumentationStatus, ModuleId};
//! use classweave::transform::{
//!     ClassBuilder, SplittingTransformer, TransformStack, TransformStep, TransformerTable,
//! };
//!
//! let mut table = TransformerTable::new();
//! table.set(
//!     ModuleId::new(0),
//!     TransformStack::new("jdbc", vec![TransformStep::InjectHelpers(vec!["x.Helper".into()])]),
//! );
//! let transformer =
//!     SplittingTransformer::new(Arc::new(table), Arc::new(InstrumentationStatus::new()));
//!
//! let class = ClassDescriptor::new("java.sql.Driver");
//! let matched: MatchSet = [ModuleId::new(0)].into_iter().collect();
//! let mut builder = ClassBuilder::new(&class.name);
//! assert_eq!(transformer.transform(&mut builder, &class, None, &matched), 1);
//! ```

mod builder;
mod splitting;
mod stack;

pub use builder::{Checkpoint, ClassBuilder, ClassEdit};
pub use splitting::SplittingTransformer;
pub use stack::{CustomTransform, CustomTransformFn, TransformStack, TransformStep, TransformerTable};
