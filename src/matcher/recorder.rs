use crate::{
    host::LoaderRef,
    matcher::{ClassDescriptor, HintCache, LoaderMatcher, MatchSet, TypeMatcher},
    module::ModuleId,
    Result,
};

/// The class event a match pass evaluates.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Parsed class.
    pub class: &'a ClassDescriptor,
    /// Defining loader, `None` for bootstrap.
    pub loader: Option<&'a LoaderRef>,
    /// `true` for explicit retransformation requests.
    pub redefining: bool,
}

impl<'a> MatchContext<'a> {
    /// Context for an initial definition.
    #[must_use]
    pub fn define(class: &'a ClassDescriptor, loader: Option<&'a LoaderRef>) -> Self {
        Self {
            class,
            loader,
            redefining: false,
        }
    }

    /// Context for a redefinition.
    #[must_use]
    pub fn redefine(class: &'a ClassDescriptor, loader: Option<&'a LoaderRef>) -> Self {
        Self {
            class,
            loader,
            redefining: true,
        }
    }
}

/// One predicate of the combining pass, bound to the module id it sets or clears.
///
/// Recorders run in registration order against a shared [`MatchSet`]. `ForType`,
/// `ForHierarchy` and `ForContextStore` can only set their bit; `NarrowType` and
/// `NarrowLocation` can only clear it, so registering refinements after the recorders that
/// set the same id yields `base && narrow1 && narrow2 ...` for that module.
#[derive(Debug, Clone)]
pub enum MatchRecorder {
    /// Sets the bit when the type predicate matches.
    ForType {
        /// Module id.
        id: ModuleId,
        /// Type predicate.
        matcher: TypeMatcher,
    },
    /// Sets the bit when the hierarchy predicate matches, unless already set. The optional
    /// loader hint is checked first and skips the hierarchy walk when it fails.
    ForHierarchy {
        /// Module id.
        id: ModuleId,
        /// Cheap loader gate.
        hint: Option<LoaderMatcher>,
        /// Hierarchy predicate.
        matcher: TypeMatcher,
    },
    /// Sets the bit of a context-store injector when its activation accepts the loader and
    /// the type predicate matches.
    ForContextStore {
        /// Injector id.
        id: ModuleId,
        /// Loader activation.
        activation: LoaderMatcher,
        /// Type predicate.
        matcher: TypeMatcher,
    },
    /// Clears a set bit when the structural predicate fails.
    NarrowType {
        /// Module id.
        id: ModuleId,
        /// Structural predicate.
        matcher: TypeMatcher,
    },
    /// Clears a set bit when the loader predicate fails.
    NarrowLocation {
        /// Module id.
        id: ModuleId,
        /// Loader predicate.
        matcher: LoaderMatcher,
    },
}

impl MatchRecorder {
    /// The id this recorder sets or clears.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        match self {
            MatchRecorder::ForType { id, .. }
            | MatchRecorder::ForHierarchy { id, .. }
            | MatchRecorder::ForContextStore { id, .. }
            | MatchRecorder::NarrowType { id, .. }
            | MatchRecorder::NarrowLocation { id, .. } => *id,
        }
    }

    /// Whether this recorder only refines an existing match.
    #[must_use]
    pub fn is_narrowing(&self) -> bool {
        matches!(
            self,
            MatchRecorder::NarrowType { .. } | MatchRecorder::NarrowLocation { .. }
        )
    }

    /// Evaluate against `ctx`, updating this recorder's bit in `set`.
    ///
    /// # Errors
    ///
    /// Propagates predicate failures. The bit is left untouched in that case.
    pub fn record(&self, ctx: &MatchContext<'_>, hints: &HintCache, set: &mut MatchSet) -> Result<()> {
        match self {
            MatchRecorder::ForType { id, matcher } => {
                if matcher.matches(ctx.class)? {
                    set.insert(*id);
                }
            }
            MatchRecorder::ForHierarchy { id, hint, matcher } => {
                if set.contains(*id) {
                    return Ok(());
                }
                if let Some(hint) = hint {
                    if !hint.matches(ctx.loader, hints)? {
                        return Ok(());
                    }
                }
                if matcher.matches(ctx.class)? {
                    set.insert(*id);
                }
            }
            MatchRecorder::ForContextStore {
                id,
                activation,
                matcher,
            } => {
                if activation.matches(ctx.loader, hints)? && matcher.matches(ctx.class)? {
                    set.insert(*id);
                }
            }
            MatchRecorder::NarrowType { id, matcher } => {
                if set.contains(*id) && !matcher.matches(ctx.class)? {
                    set.remove(*id);
                }
            }
            MatchRecorder::NarrowLocation { id, matcher } => {
                if set.contains(*id) && !matcher.matches(ctx.loader, hints)? {
                    set.remove(*id);
                }
            }
        }
        Ok(())
    }
}
