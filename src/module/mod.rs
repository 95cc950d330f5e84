//! Instrumentation module descriptors and the offline module registry.
//!
//! A module is one independently authored unit of instrumentation: a match strategy saying
//! which classes it applies to, optional loader and structural constraints, and the
//! transformation it performs (helper injection, context-store rewrites, method advice and
//! custom transforms). Module authors describe it with a [`ModuleDescriptor`]; the
//! [`crate::installer::CombiningTransformerBuilder`] turns descriptors into match recorders
//! and transform stacks. Callers never need to know whether a module ended up in the
//! known-types index or as a dynamic recorder.
//!
//! # Key Components
//!
//! - [`ModuleId`] - dense integer handle indexing every per-module table
//! - [`ModuleDescriptor`] - what a module matches and what it does
//! - [`MatchStrategy`] - the closed set of type-matching strategies
//! - [`ModuleIndex`] - the ahead-of-time registry: static ids and the known-types index
//! - [`MuzzleCheck`] - per-loader safety check on a module's references
//! - [`InstrumentationStatus`] - per-module applied / failed / muzzled counters
//!
//! # Example
//!
//! ```rust
//! use classweave::matcher::{LoaderMatcher, MethodMatcher, TypeMatcher};
//! use classweave::module::{MatchStrategy, ModuleDescriptor};
//!
//! let servlet = ModuleDescriptor::new(
//!     "servlet",
//!     MatchStrategy::Hierarchy {
//!         marker: Some("javax.servlet.Servlet".into()),
//!         matcher: TypeMatcher::has_super_type("javax.servlet.Servlet"),
//!     },
//! )
//! .alias("servlet-3")
//! .helper("com.acme.agent.ServletDecorator")
//! .advice(MethodMatcher::named("service"), "com.acme.agent.ServiceAdvice")
//! .context_store("javax.servlet.ServletRequest", "com.acme.agent.Span");
//!
//! assert!(servlet.validate().is_ok());
//! ```

mod index;
mod muzzle;
mod status;

pub use index::ModuleIndex;
pub use muzzle::MuzzleCheck;
pub use status::{InstrumentationStatus, ModuleStatus};

use std::fmt;

use bitflags::bitflags;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    matcher::{LoaderMatcher, MethodMatcher, TypeMatcher},
    transform::CustomTransform,
    Error, Result,
};

/// Dense integer handle of a module.
///
/// Static ids `0..N` come from the [`ModuleIndex`]; supplementary ids for runtime-configured
/// modules and context-store injectors are allocated above that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Creates an id from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        ModuleId(raw)
    }

    /// Creates an id from a table index, saturating at `u32::MAX`.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        ModuleId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into per-module tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Module category flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModuleFlags: u8 {
        /// Targets classes defined by the bootstrap loader; context stores activate on every loader.
        const FOR_BOOTSTRAP = 0b0000_0001;
        /// Instruments the agent's own code source; never muzzle-checked.
        const AGENT_CODE_SOURCE = 0b0000_0010;
    }
}

/// Product area a module belongs to. Only modules of enabled systems are installed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TargetSystem {
    /// Distributed tracing.
    Tracing,
    /// Continuous profiling.
    Profiling,
    /// Application security.
    Appsec,
    /// Interactive application security testing.
    Iast,
    /// Test visibility.
    Civisibility,
    /// Universal service monitoring.
    Usm,
    /// Shared infrastructure, always enabled.
    Common,
}

/// How a module selects the classes it applies to.
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    /// Exactly one class name.
    SingleType(String),
    /// A finite list of class names.
    KnownTypes(Vec<String>),
    /// A hierarchy predicate, optionally gated on the loader exposing a marker type.
    Hierarchy {
        /// Class the loader must expose before the hierarchy walk runs.
        marker: Option<String>,
        /// The hierarchy predicate.
        matcher: TypeMatcher,
    },
    /// A predicate selecting call-site types.
    CallSite(TypeMatcher),
    /// Class names supplied by runtime configuration; may be empty.
    ConfiguredTypes(Vec<String>),
    /// Known class names with an optional hierarchy fallback.
    Shortcut {
        /// Class names resolved through the known-types index.
        known: Vec<String>,
        /// Fallback hierarchy predicate.
        hierarchy: TypeMatcher,
        /// Marker gating the fallback.
        marker: Option<String>,
        /// Skip the fallback and rely on `known` only.
        only_known: bool,
    },
}

impl MatchStrategy {
    /// Names that can be enumerated ahead of time for the known-types index.
    #[must_use]
    pub fn known_types(&self) -> &[String] {
        match self {
            MatchStrategy::SingleType(name) => std::slice::from_ref(name),
            MatchStrategy::KnownTypes(names) | MatchStrategy::Shortcut { known: names, .. } => {
                names
            }
            _ => &[],
        }
    }
}

/// One method-level advice application.
#[derive(Debug, Clone)]
pub struct AdviceBinding {
    /// Methods the advice applies to.
    pub methods: MethodMatcher,
    /// Class holding the advice code.
    pub advice_class: String,
}

/// Everything the pipeline needs to know about one instrumentation module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Primary name, the key into the [`ModuleIndex`].
    pub name: String,
    /// Further names the module can be disabled by.
    pub aliases: Vec<String>,
    /// Product area.
    pub target_system: TargetSystem,
    /// Disabled modules are skipped by the installer.
    pub enabled: bool,
    /// Category flags.
    pub flags: ModuleFlags,
    /// Type-matching strategy.
    pub strategy: MatchStrategy,
    /// Loader eligibility.
    pub loader_matcher: LoaderMatcher,
    /// Additional structural constraint on matched classes.
    pub structure: Option<TypeMatcher>,
    /// Helper classes injected into the target loader.
    pub helpers: Vec<String>,
    /// Method advice, applied in declaration order.
    pub advice: Vec<AdviceBinding>,
    /// Advice classes still applied when the module's target system is disabled. `None`
    /// means the module is skipped entirely in that case.
    pub general_purpose_advice: Option<Vec<String>>,
    /// Context stores as `(key type, value type)`, in declaration order.
    pub context_store: Vec<(String, String)>,
    /// Methods that are never advised.
    pub method_ignore: MethodMatcher,
    /// Custom type transforms, applied before advice.
    pub transforms: Vec<CustomTransform>,
    /// Classes the advice references; checked per loader by the muzzle check.
    pub muzzle_references: Vec<String>,
}

impl ModuleDescriptor {
    /// Creates an enabled tracing module with no constraints and no transformation.
    #[must_use]
    pub fn new(name: impl Into<String>, strategy: MatchStrategy) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            target_system: TargetSystem::Tracing,
            enabled: true,
            flags: ModuleFlags::empty(),
            strategy,
            loader_matcher: LoaderMatcher::Any,
            structure: None,
            helpers: Vec::new(),
            advice: Vec::new(),
            general_purpose_advice: None,
            context_store: Vec::new(),
            method_ignore: MethodMatcher::IsSynthetic,
            transforms: Vec::new(),
            muzzle_references: Vec::new(),
        }
    }

    /// Adds an alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the target system.
    #[must_use]
    pub fn target_system(mut self, target_system: TargetSystem) -> Self {
        self.target_system = target_system;
        self
    }

    /// Enables or disables the module.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the category flags.
    #[must_use]
    pub fn flags(mut self, flags: ModuleFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the loader eligibility predicate.
    #[must_use]
    pub fn loader(mut self, matcher: LoaderMatcher) -> Self {
        self.loader_matcher = matcher;
        self
    }

    /// Sets the structural constraint.
    #[must_use]
    pub fn structure(mut self, matcher: TypeMatcher) -> Self {
        self.structure = Some(matcher);
        self
    }

    /// Adds a helper class.
    #[must_use]
    pub fn helper(mut self, class_name: impl Into<String>) -> Self {
        self.helpers.push(class_name.into());
        self
    }

    /// Adds a method advice binding.
    #[must_use]
    pub fn advice(mut self, methods: MethodMatcher, advice_class: impl Into<String>) -> Self {
        self.advice.push(AdviceBinding {
            methods,
            advice_class: advice_class.into(),
        });
        self
    }

    /// Marks advice classes as general purpose: they keep applying when the target system
    /// of this module is disabled, while the rest of its advice is dropped.
    #[must_use]
    pub fn general_purpose_advice<I, S>(mut self, advice_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.general_purpose_advice = Some(advice_classes.into_iter().map(Into::into).collect());
        self
    }

    /// This module reduced to its general-purpose advice. Everything besides method advice
    /// is kept.
    #[must_use]
    pub fn general_purpose_only(&self) -> ModuleDescriptor {
        let keep = self.general_purpose_advice.as_deref().unwrap_or_default();
        let mut reduced = self.clone();
        reduced
            .advice
            .retain(|binding| keep.iter().any(|class| *class == binding.advice_class));
        reduced
    }

    /// Declares a context store from `key` to `value`.
    #[must_use]
    pub fn context_store(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_store.push((key.into(), value.into()));
        self
    }

    /// Replaces the method ignore predicate.
    #[must_use]
    pub fn method_ignore(mut self, matcher: MethodMatcher) -> Self {
        self.method_ignore = matcher;
        self
    }

    /// Adds a custom type transform.
    #[must_use]
    pub fn transform(mut self, transform: CustomTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Sets the classes checked by the muzzle check.
    #[must_use]
    pub fn muzzle_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.muzzle_references = references.into_iter().map(Into::into).collect();
        self
    }

    /// Primary name followed by aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether the module declares any context store.
    #[must_use]
    pub fn has_context_store(&self) -> bool {
        !self.context_store.is_empty()
    }

    /// Check the descriptor for combinations the pipeline cannot register.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModule`] for an empty name, an empty single/known type name,
    /// a known-types-only shortcut without types, or a context store with an empty type name.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidModule {
            module: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("module name is empty"));
        }

        match &self.strategy {
            MatchStrategy::SingleType(name) if name.is_empty() => {
                return Err(invalid("single type name is empty"));
            }
            MatchStrategy::KnownTypes(names) if names.is_empty() => {
                return Err(invalid("known types list is empty"));
            }
            MatchStrategy::KnownTypes(names) if names.iter().any(String::is_empty) => {
                return Err(invalid("known types list contains an empty name"));
            }
            MatchStrategy::Shortcut {
                known, only_known, ..
            } if *only_known && known.is_empty() => {
                return Err(invalid("shortcut restricted to known types declares none"));
            }
            _ => {}
        }

        if self
            .context_store
            .iter()
            .any(|(key, value)| key.is_empty() || value.is_empty())
        {
            return Err(invalid("context store declares an empty type name"));
        }

        Ok(())
    }
}
