//! The combining matcher and everything it evaluates.
//!
//! For each class the runtime is about to define, the combining matcher decides in one pass
//! which of the registered modules apply. The pass is built from:
//!
//! - [`KnownTypesIndex`] - O(1) lookup from class name to the modules that name selects
//! - [`MatchRecorder`] - one predicate per module and purpose, setting or clearing that
//!   module's bit in the shared [`MatchSet`]
//! - [`TypeMatcher`], [`LoaderMatcher`], [`MethodMatcher`] - the predicates themselves
//! - [`HintCache`] - memoised class-visibility lookups behind loader hints
//! - [`DeferredMatching`] - postpones matching for chosen loaders, then catches up
//! - [`GlobalIgnores`] - classes never matched at all
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classweave::matcher::{
//!     ClassDescriptor, CombiningMatcher, DeferredMatching, HintCache, KnownTypesIndex,
//!     MatchContext, MatchRecorder, MatchSet, TypeMatcher,
//! };
//! use classweave::module::ModuleId;
//!
//! let a = ModuleId::new(0);
//! let matcher = CombiningMatcher::new(
//!     Arc::new(KnownTypesIndex::new()),
//!     MatchSet::new(),
//!     vec![MatchRecorder::ForType { id: a, matcher: TypeMatcher::named("com.foo.Bar") }],
//!     Arc::new(HintCache::new()),
//!     Arc::new(DeferredMatching::inactive()),
//! );
//!
//! let class = ClassDescriptor::new("com.foo.Bar");
//! let mut set = MatchSet::new();
//! assert!(matcher.match_class(&MatchContext::define(&class, None), &mut set));
//! assert!(set.contains(a));
//! ```

mod combining;
mod deferral;
mod descriptor;
mod element;
mod hints;
mod ignores;
mod known_types;
mod recorder;
mod set;

pub use combining::{CombiningMatcher, DECORATOR_ANNOTATIONS};
pub use deferral::{
    spawn_deferred_rescan, DeferredMatching, MatchingState, DEFERRAL_THREAD_NAME,
    MIN_DEFER_DELAY,
};
pub use descriptor::{ClassDescriptor, MethodDescriptor};
pub use element::{
    LoaderMatcher, LoaderPredicate, MethodMatcher, MethodPredicate, TypeMatcher, TypePredicate,
};
pub use hints::HintCache;
pub use ignores::{GlobalIgnores, LAMBDA_MARKER};
pub use known_types::KnownTypesIndex;
pub use recorder::{MatchContext, MatchRecorder};
pub use set::{MatchSet, MatchSetIter};
