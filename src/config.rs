//! Agent configuration.
//!
//! [`AgentConfig`] holds the operational switches of the pipeline: the deployment strategy,
//! deferred matching, global excludes, context-store injection, the cache reset interval
//! and which modules are enabled. It can be built in code with the `with_*` setters, from
//! dotted property keys with [`AgentConfig::from_properties`], or from `CLASSWEAVE_*`
//! environment variables with [`AgentConfig::from_env`].
//!
//! | Key | Default |
//! |-----|---------|
//! | `instrumentation.legacy.installer` | `false` |
//! | `instrumentation.defer.until` | unset |
//! | `instrumentation.defer.classloaders` | empty |
//! | `instrumentation.classes.exclude` | empty |
//! | `instrumentation.context.runtime_injection` | `true` |
//! | `instrumentation.resolver.reset_interval` | unset |
//! | `instrumentation.resolver.cache_capacity` | `8192` |
//! | `instrumentation.target_systems` | `tracing` |
//! | `instrumentation.modules.disabled` | empty |

use std::{borrow::Cow, str::FromStr, time::Duration};

use log::warn;

use crate::{
    matcher::{HintCache, MIN_DEFER_DELAY},
    module::{ModuleDescriptor, TargetSystem},
    Error, Result,
};

/// Selects `InstallStrategy::Legacy` when `true`.
pub const LEGACY_INSTALLER: &str = "instrumentation.legacy.installer";
/// Deferral delay, `<n>[s|m|h]`.
pub const DEFER_UNTIL: &str = "instrumentation.defer.until";
/// Comma separated loader class names whose initial loads are deferred.
pub const DEFER_CLASSLOADERS: &str = "instrumentation.defer.classloaders";
/// Comma separated global excludes; a trailing `*` means prefix.
pub const CLASSES_EXCLUDE: &str = "instrumentation.classes.exclude";
/// Whether context stores get dedicated injector modules.
pub const RUNTIME_CONTEXT_INJECTION: &str = "instrumentation.context.runtime_injection";
/// Interval of the hint and muzzle cache reset.
pub const RESOLVER_RESET_INTERVAL: &str = "instrumentation.resolver.reset_interval";
/// Maximum number of cached class-visibility answers.
pub const RESOLVER_CACHE_CAPACITY: &str = "instrumentation.resolver.cache_capacity";
/// Comma separated enabled target systems.
pub const TARGET_SYSTEMS: &str = "instrumentation.target_systems";
/// Comma separated module names disabled by configuration.
pub const MODULES_DISABLED: &str = "instrumentation.modules.disabled";

const ENV_KEYS: [(&str, &str); 9] = [
    ("CLASSWEAVE_LEGACY_INSTALLER", LEGACY_INSTALLER),
    ("CLASSWEAVE_DEFER_UNTIL", DEFER_UNTIL),
    ("CLASSWEAVE_DEFER_CLASSLOADERS", DEFER_CLASSLOADERS),
    ("CLASSWEAVE_CLASSES_EXCLUDE", CLASSES_EXCLUDE),
    ("CLASSWEAVE_CONTEXT_RUNTIME_INJECTION", RUNTIME_CONTEXT_INJECTION),
    ("CLASSWEAVE_RESOLVER_RESET_INTERVAL", RESOLVER_RESET_INTERVAL),
    ("CLASSWEAVE_RESOLVER_CACHE_CAPACITY", RESOLVER_CACHE_CAPACITY),
    ("CLASSWEAVE_TARGET_SYSTEMS", TARGET_SYSTEMS),
    ("CLASSWEAVE_MODULES_DISABLED", MODULES_DISABLED),
];

/// How modules are wired into the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallStrategy {
    /// One transformer running a single combined matching pass.
    #[default]
    Combining,
    /// One transformer per module, each with its own matching pass.
    Legacy,
}

/// Configuration of the instrumentation agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Deployment strategy (default: combining).
    pub strategy: InstallStrategy,

    /// Delay before deferred matching resumes.
    pub defer_until: Option<Duration>,

    /// Loader class names whose initial definitions are deferred.
    pub deferred_loaders: Vec<String>,

    /// Global exclude patterns.
    pub excludes: Vec<String>,

    /// Allocate context-store injector modules (default: true).
    pub runtime_context_injection: bool,

    /// Interval of the periodic hint and muzzle cache reset.
    pub resolver_reset_interval: Option<Duration>,

    /// Cached class-visibility answers kept before the cache starts over.
    pub resolver_cache_capacity: usize,

    /// Enabled target systems (default: tracing). `common` is always enabled.
    pub target_systems: Vec<TargetSystem>,

    /// Module names or aliases disabled by configuration.
    pub disabled_modules: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            strategy: InstallStrategy::Combining,
            defer_until: None,
            deferred_loaders: Vec::new(),
            excludes: Vec::new(),
            runtime_context_injection: true,
            resolver_reset_interval: None,
            resolver_cache_capacity: HintCache::DEFAULT_CAPACITY,
            target_systems: vec![TargetSystem::Tracing],
            disabled_modules: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deployment strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: InstallStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Configures deferred matching.
    ///
    /// # Arguments
    ///
    /// * `delay` - how long to defer; deferral only starts above five seconds
    /// * `loaders` - loader class names whose initial definitions are deferred
    #[must_use]
    pub fn with_deferral<I, S>(mut self, delay: Duration, loaders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defer_until = Some(delay);
        self.deferred_loaders = loaders.into_iter().map(Into::into).collect();
        self
    }

    /// Adds global exclude patterns.
    #[must_use]
    pub fn with_excludes<I, S>(mut self, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(excludes.into_iter().map(Into::into));
        self
    }

    /// Enables or disables context-store injector modules.
    #[must_use]
    pub fn with_runtime_context_injection(mut self, enable: bool) -> Self {
        self.runtime_context_injection = enable;
        self
    }

    /// Sets the cache reset interval.
    #[must_use]
    pub fn with_reset_interval(mut self, interval: Duration) -> Self {
        self.resolver_reset_interval = Some(interval);
        self
    }

    /// Sets the class-visibility cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.resolver_cache_capacity = capacity;
        self
    }

    /// Replaces the enabled target systems.
    #[must_use]
    pub fn with_target_systems<I>(mut self, systems: I) -> Self
    where
        I: IntoIterator<Item = TargetSystem>,
    {
        self.target_systems = systems.into_iter().collect();
        self
    }

    /// Disables modules by name or alias.
    #[must_use]
    pub fn with_disabled_modules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_modules.extend(names.into_iter().map(Into::into));
        self
    }

    /// Whether deferred matching will start with this configuration.
    #[must_use]
    pub fn defers_matching(&self) -> bool {
        self.defer_until.is_some_and(|delay| delay > MIN_DEFER_DELAY)
            && !self.deferred_loaders.is_empty()
    }

    /// Whether `system` is enabled.
    #[must_use]
    pub fn is_target_enabled(&self, system: TargetSystem) -> bool {
        system == TargetSystem::Common || self.target_systems.contains(&system)
    }

    /// Whether `module` should be installed: enabled, not disabled by any of its names, and
    /// either of an enabled target system or carrying general-purpose advice.
    #[must_use]
    pub fn is_module_enabled(&self, module: &ModuleDescriptor) -> bool {
        module.enabled
            && (self.is_target_enabled(module.target_system)
                || module.general_purpose_advice.is_some())
            && !module
                .names()
                .any(|name| self.disabled_modules.iter().any(|d| d == name))
    }

    /// The form in which `module` is installed, if at all. A module whose target system is
    /// disabled keeps only its general-purpose advice.
    #[must_use]
    pub fn installable<'a>(
        &self,
        module: &'a ModuleDescriptor,
    ) -> Option<Cow<'a, ModuleDescriptor>> {
        if !self.is_module_enabled(module) {
            None
        } else if self.is_target_enabled(module.target_system) {
            Some(Cow::Borrowed(module))
        } else {
            Some(Cow::Owned(module.general_purpose_only()))
        }
    }

    /// Build from dotted property keys. Unknown keys are ignored.
    ///
    /// Unparsable delays are logged and treated as unset, which disables the feature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed booleans and unknown target systems.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = AgentConfig::default();
        for (key, value) in properties {
            config.apply(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Build from the `CLASSWEAVE_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::from_properties`].
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(std::env::vars())
    }

    /// Build from `(name, value)` pairs shaped like environment variables.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::from_properties`].
    pub fn from_env_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::from_properties(vars.into_iter().filter_map(|(name, value)| {
            ENV_KEYS
                .iter()
                .find(|(env, _)| *env == name)
                .map(|(_, key)| (*key, value))
        }))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            LEGACY_INSTALLER => {
                self.strategy = if parse_bool(key, value)? {
                    InstallStrategy::Legacy
                } else {
                    InstallStrategy::Combining
                };
            }
            DEFER_UNTIL => self.defer_until = parse_delay_or_warn(key, value),
            DEFER_CLASSLOADERS => self.deferred_loaders = parse_list(value),
            CLASSES_EXCLUDE => self.excludes = parse_list(value),
            RUNTIME_CONTEXT_INJECTION => self.runtime_context_injection = parse_bool(key, value)?,
            RESOLVER_RESET_INTERVAL => {
                self.resolver_reset_interval = parse_delay_or_warn(key, value);
            }
            RESOLVER_CACHE_CAPACITY => {
                self.resolver_cache_capacity =
                    value.trim().parse().map_err(|_| Error::Config {
                        key: key.to_string(),
                        message: format!("expected a positive count, got '{value}'"),
                    })?;
            }
            TARGET_SYSTEMS => {
                self.target_systems = parse_list(value)
                    .iter()
                    .map(|name| {
                        TargetSystem::from_str(name).map_err(|_| Error::Config {
                            key: key.to_string(),
                            message: format!("unknown target system '{name}'"),
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            MODULES_DISABLED => self.disabled_modules = parse_list(value),
            _ => {}
        }
        Ok(())
    }
}

/// Parse a delay of the form `<n>[s|m|h]`, unit case-insensitive, seconds by default.
///
/// ```rust
/// use std::time::Duration;
/// use classweave::config::parse_simple_delay;
///
/// assert_eq!(parse_simple_delay("10S"), Some(Duration::from_secs(10)));
/// assert_eq!(parse_simple_delay(" 2m "), Some(Duration::from_secs(120)));
/// assert_eq!(parse_simple_delay("5"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_simple_delay("soon"), None);
/// ```
#[must_use]
pub fn parse_simple_delay(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last()? {
        (i, 's' | 'S') => (&value[..i], 1),
        (i, 'm' | 'M') => (&value[..i], 60),
        (i, 'h' | 'H') => (&value[..i], 3600),
        _ => (value, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    amount.checked_mul(multiplier).map(Duration::from_secs)
}

fn parse_delay_or_warn(key: &str, value: &str) -> Option<Duration> {
    let delay = parse_simple_delay(value);
    if delay.is_none() {
        warn!("Ignoring {key}={value}: expected a delay like 30s, 5m or 1h");
    }
    delay
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
