//! Type, class-loader and method predicates.
//!
//! Modules describe what they apply to with the three predicate families defined here. Each
//! family is a closed enum with a single evaluation function, composable through
//! `and` / `or` / `not`, plus a `Custom` escape hatch holding a fallible closure for checks
//! the built-in variants cannot express.
//!
//! # Available Matchers
//!
//! | Matcher | Evaluated against |
//! |---------|-------------------|
//! | [`TypeMatcher`] | [`ClassDescriptor`] of the class being defined |
//! | [`LoaderMatcher`] | the defining loader (`None` = bootstrap) |
//! | [`MethodMatcher`] | each declared [`MethodDescriptor`] when advice is applied |
//!
//! Predicates return [`crate::Result<bool>`]: an `Err` means "this predicate could not decide"
//! and is treated by the combining matcher as no contribution for the owning module.
//!
//! ```rust
//! use classweave::matcher::{ClassDescriptor, TypeMatcher};
//!
//! let matcher = TypeMatcher::has_super_type("com.foo.Base")
//!     .and(TypeMatcher::IsInterface.not());
//!
//! let class = ClassDescriptor::new("com.foo.Bar").extends("com.foo.Base");
//! assert!(matcher.matches(&class)?);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    host::LoaderRef,
    matcher::{ClassDescriptor, HintCache, MethodDescriptor},
    module::MuzzleCheck,
    Error, Result,
};

/// Closure type behind [`TypeMatcher::Custom`].
pub type TypePredicate = dyn Fn(&ClassDescriptor) -> Result<bool> + Send + Sync;

/// Closure type behind [`LoaderMatcher::Custom`].
pub type LoaderPredicate = dyn Fn(Option<&LoaderRef>) -> Result<bool> + Send + Sync;

/// Closure type behind [`MethodMatcher::Custom`].
pub type MethodPredicate = dyn Fn(&MethodDescriptor) -> Result<bool> + Send + Sync;

/// Predicate over the class being defined.
#[derive(Clone)]
pub enum TypeMatcher {
    /// Matches every class.
    Any,
    /// Exact binary name.
    Named(String),
    /// Any of the given binary names.
    NamedOneOf(Vec<String>),
    /// Binary name starts with the prefix.
    NameStartsWith(String),
    /// The class itself, a super class or an interface has the name.
    HasSuperType(String),
    /// A super class has the name.
    ExtendsClass(String),
    /// An implemented interface has the name.
    ImplementsInterface(String),
    /// The class declares the annotation.
    DeclaresAnnotation(String),
    /// The class is an interface.
    IsInterface,
    /// User supplied predicate.
    Custom {
        /// Shown in logs when the predicate fails.
        description: String,
        /// The predicate.
        predicate: Arc<TypePredicate>,
    },
    /// Both must match.
    And(Box<TypeMatcher>, Box<TypeMatcher>),
    /// Either must match.
    Or(Box<TypeMatcher>, Box<TypeMatcher>),
    /// Negation.
    Not(Box<TypeMatcher>),
}

impl TypeMatcher {
    /// Exact binary name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        TypeMatcher::Named(name.into())
    }

    /// Any of the given binary names.
    #[must_use]
    pub fn named_one_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeMatcher::NamedOneOf(names.into_iter().map(Into::into).collect())
    }

    /// The class itself, a super class or an interface has the name.
    #[must_use]
    pub fn has_super_type(name: impl Into<String>) -> Self {
        TypeMatcher::HasSuperType(name.into())
    }

    /// User supplied predicate.
    #[must_use]
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ClassDescriptor) -> Result<bool> + Send + Sync + 'static,
    {
        TypeMatcher::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Conjunction with `other`.
    #[must_use]
    pub fn and(self, other: TypeMatcher) -> Self {
        TypeMatcher::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with `other`.
    #[must_use]
    pub fn or(self, other: TypeMatcher) -> Self {
        TypeMatcher::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        TypeMatcher::Not(Box::new(self))
    }

    /// Evaluate against `class`.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`TypeMatcher::Custom`] predicates.
    pub fn matches(&self, class: &ClassDescriptor) -> Result<bool> {
        Ok(match self {
            TypeMatcher::Any => true,
            TypeMatcher::Named(name) => class.name == *name,
            TypeMatcher::NamedOneOf(names) => names.iter().any(|n| *n == class.name),
            TypeMatcher::NameStartsWith(prefix) => class.name.starts_with(prefix.as_str()),
            TypeMatcher::HasSuperType(name) => class.has_super_type(name),
            TypeMatcher::ExtendsClass(name) => class.extends_class(name),
            TypeMatcher::ImplementsInterface(name) => class.implements_interface(name),
            TypeMatcher::DeclaresAnnotation(name) => class.is_annotated_with(name),
            TypeMatcher::IsInterface => class.is_interface,
            TypeMatcher::Custom {
                description,
                predicate,
            } => predicate(class).map_err(|e| attribute(description, e))?,
            TypeMatcher::And(a, b) => a.matches(class)? && b.matches(class)?,
            TypeMatcher::Or(a, b) => a.matches(class)? || b.matches(class)?,
            TypeMatcher::Not(inner) => !inner.matches(class)?,
        })
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeMatcher::Any => write!(f, "any()"),
            TypeMatcher::Named(name) => write!(f, "named({name})"),
            TypeMatcher::NamedOneOf(names) => write!(f, "namedOneOf({})", names.join(", ")),
            TypeMatcher::NameStartsWith(prefix) => write!(f, "nameStartsWith({prefix})"),
            TypeMatcher::HasSuperType(name) => write!(f, "hasSuperType({name})"),
            TypeMatcher::ExtendsClass(name) => write!(f, "extendsClass({name})"),
            TypeMatcher::ImplementsInterface(name) => write!(f, "implementsInterface({name})"),
            TypeMatcher::DeclaresAnnotation(name) => write!(f, "declaresAnnotation({name})"),
            TypeMatcher::IsInterface => write!(f, "isInterface()"),
            TypeMatcher::Custom { description, .. } => write!(f, "custom({description})"),
            TypeMatcher::And(a, b) => write!(f, "({a:?} and {b:?})"),
            TypeMatcher::Or(a, b) => write!(f, "({a:?} or {b:?})"),
            TypeMatcher::Not(inner) => write!(f, "not({inner:?})"),
        }
    }
}

/// Predicate over the defining class loader.
///
/// The bootstrap loader (`None`) has no resources to probe, so [`LoaderMatcher::HasClassNamed`]
/// and [`LoaderMatcher::LoaderNamed`] never match it, while [`LoaderMatcher::Muzzle`] always
/// passes it.
#[derive(Clone)]
pub enum LoaderMatcher {
    /// Matches every loader, including bootstrap.
    Any,
    /// Matches only the bootstrap loader.
    Bootstrap,
    /// The loader exposes at least one of the named classes. Answers are memoised in the
    /// [`HintCache`].
    HasClassNamed(Vec<String>),
    /// The loader's own class name is one of the given names.
    LoaderNamed(Vec<String>),
    /// The module's muzzle references all resolve through the loader.
    Muzzle(Arc<MuzzleCheck>),
    /// User supplied predicate.
    Custom {
        /// Shown in logs when the predicate fails.
        description: String,
        /// The predicate.
        predicate: Arc<LoaderPredicate>,
    },
    /// Both must match.
    And(Box<LoaderMatcher>, Box<LoaderMatcher>),
    /// Either must match.
    Or(Box<LoaderMatcher>, Box<LoaderMatcher>),
    /// Negation.
    Not(Box<LoaderMatcher>),
}

impl LoaderMatcher {
    /// The loader exposes `class_name`.
    #[must_use]
    pub fn has_class_named(class_name: impl Into<String>) -> Self {
        LoaderMatcher::HasClassNamed(vec![class_name.into()])
    }

    /// The loader exposes at least one of `class_names`.
    #[must_use]
    pub fn has_class_named_one_of<I, S>(class_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LoaderMatcher::HasClassNamed(class_names.into_iter().map(Into::into).collect())
    }

    /// The loader's own class name is `loader_class`.
    #[must_use]
    pub fn loader_named(loader_class: impl Into<String>) -> Self {
        LoaderMatcher::LoaderNamed(vec![loader_class.into()])
    }

    /// User supplied predicate.
    #[must_use]
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Option<&LoaderRef>) -> Result<bool> + Send + Sync + 'static,
    {
        LoaderMatcher::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Conjunction with `other`.
    #[must_use]
    pub fn and(self, other: LoaderMatcher) -> Self {
        LoaderMatcher::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with `other`.
    #[must_use]
    pub fn or(self, other: LoaderMatcher) -> Self {
        LoaderMatcher::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        LoaderMatcher::Not(Box::new(self))
    }

    /// Conjunction that treats [`LoaderMatcher::Any`] as the identity, so composing with an
    /// unconstrained side adds no evaluation cost.
    #[must_use]
    pub fn require_both(lhs: LoaderMatcher, rhs: LoaderMatcher) -> Self {
        match (lhs, rhs) {
            (LoaderMatcher::Any, rhs) => rhs,
            (lhs, LoaderMatcher::Any) => lhs,
            (lhs, rhs) => lhs.and(rhs),
        }
    }

    /// Returns `true` for [`LoaderMatcher::Any`].
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, LoaderMatcher::Any)
    }

    /// Evaluate against `loader`.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`LoaderMatcher::Custom`] predicates.
    pub fn matches(&self, loader: Option<&LoaderRef>, hints: &HintCache) -> Result<bool> {
        Ok(match self {
            LoaderMatcher::Any => true,
            LoaderMatcher::Bootstrap => loader.is_none(),
            LoaderMatcher::HasClassNamed(names) => loader
                .is_some_and(|loader| names.iter().any(|name| hints.has_class(loader, name))),
            LoaderMatcher::LoaderNamed(names) => {
                loader.is_some_and(|loader| names.iter().any(|name| name == loader.class_name()))
            }
            LoaderMatcher::Muzzle(check) => check.matches(loader),
            LoaderMatcher::Custom {
                description,
                predicate,
            } => predicate(loader).map_err(|e| attribute(description, e))?,
            LoaderMatcher::And(a, b) => a.matches(loader, hints)? && b.matches(loader, hints)?,
            LoaderMatcher::Or(a, b) => a.matches(loader, hints)? || b.matches(loader, hints)?,
            LoaderMatcher::Not(inner) => !inner.matches(loader, hints)?,
        })
    }
}

impl fmt::Debug for LoaderMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderMatcher::Any => write!(f, "any()"),
            LoaderMatcher::Bootstrap => write!(f, "bootstrap()"),
            LoaderMatcher::HasClassNamed(names) => write!(f, "hasClassNamed({})", names.join(", ")),
            LoaderMatcher::LoaderNamed(names) => write!(f, "loaderNamed({})", names.join(", ")),
            LoaderMatcher::Muzzle(check) => write!(f, "muzzle({})", check.module()),
            LoaderMatcher::Custom { description, .. } => write!(f, "custom({description})"),
            LoaderMatcher::And(a, b) => write!(f, "({a:?} and {b:?})"),
            LoaderMatcher::Or(a, b) => write!(f, "({a:?} or {b:?})"),
            LoaderMatcher::Not(inner) => write!(f, "not({inner:?})"),
        }
    }
}

/// Predicate over a declared method, used to select advice targets.
#[derive(Clone)]
pub enum MethodMatcher {
    /// Matches every method.
    Any,
    /// Matches no method.
    None,
    /// Exact method name.
    Named(String),
    /// Any of the given method names.
    NamedOneOf(Vec<String>),
    /// Exact name and type descriptor.
    Signature {
        /// Method name.
        name: String,
        /// Type descriptor.
        descriptor: String,
    },
    /// Compiler-generated methods.
    IsSynthetic,
    /// User supplied predicate.
    Custom {
        /// Shown in logs when the predicate fails.
        description: String,
        /// The predicate.
        predicate: Arc<MethodPredicate>,
    },
    /// Both must match.
    And(Box<MethodMatcher>, Box<MethodMatcher>),
    /// Either must match.
    Or(Box<MethodMatcher>, Box<MethodMatcher>),
    /// Negation.
    Not(Box<MethodMatcher>),
}

impl MethodMatcher {
    /// Exact method name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        MethodMatcher::Named(name.into())
    }

    /// User supplied predicate.
    #[must_use]
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&MethodDescriptor) -> Result<bool> + Send + Sync + 'static,
    {
        MethodMatcher::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Conjunction with `other`.
    #[must_use]
    pub fn and(self, other: MethodMatcher) -> Self {
        MethodMatcher::And(Box::new(self), Box::new(other))
    }

    /// Disjunction with `other`.
    #[must_use]
    pub fn or(self, other: MethodMatcher) -> Self {
        MethodMatcher::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        MethodMatcher::Not(Box::new(self))
    }

    /// Evaluate against `method`.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`MethodMatcher::Custom`] predicates.
    pub fn matches(&self, method: &MethodDescriptor) -> Result<bool> {
        Ok(match self {
            MethodMatcher::Any => true,
            MethodMatcher::None => false,
            MethodMatcher::Named(name) => method.name == *name,
            MethodMatcher::NamedOneOf(names) => names.iter().any(|n| *n == method.name),
            MethodMatcher::Signature { name, descriptor } => {
                method.name == *name && method.descriptor == *descriptor
            }
            MethodMatcher::IsSynthetic => method.synthetic,
            MethodMatcher::Custom {
                description,
                predicate,
            } => predicate(method).map_err(|e| attribute(description, e))?,
            MethodMatcher::And(a, b) => a.matches(method)? && b.matches(method)?,
            MethodMatcher::Or(a, b) => a.matches(method)? || b.matches(method)?,
            MethodMatcher::Not(inner) => !inner.matches(method)?,
        })
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::Any => write!(f, "any()"),
            MethodMatcher::None => write!(f, "none()"),
            MethodMatcher::Named(name) => write!(f, "named({name})"),
            MethodMatcher::NamedOneOf(names) => write!(f, "namedOneOf({})", names.join(", ")),
            MethodMatcher::Signature { name, descriptor } => write!(f, "{name}{descriptor}"),
            MethodMatcher::IsSynthetic => write!(f, "isSynthetic()"),
            MethodMatcher::Custom { description, .. } => write!(f, "custom({description})"),
            MethodMatcher::And(a, b) => write!(f, "({a:?} and {b:?})"),
            MethodMatcher::Or(a, b) => write!(f, "({a:?} or {b:?})"),
            MethodMatcher::Not(inner) => write!(f, "not({inner:?})"),
        }
    }
}

/// Attribute a custom predicate's failure to the predicate, keeping errors that already are.
fn attribute(description: &str, error: Error) -> Error {
    match error {
        Error::Predicate { .. } => error,
        other => Error::Predicate {
            matcher: description.to_string(),
            message: other.to_string(),
        },
    }
}
