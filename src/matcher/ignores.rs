use std::collections::HashSet;

/// Marker contained in the names of runtime-generated lambda classes.
pub const LAMBDA_MARKER: &str = "$$Lambda";

/// Classes that are never matched, regardless of module predicates.
///
/// Excludes are either literal binary names or prefixes written with a trailing `*`.
/// Lambda classes are always ignored; they cannot be retransformed and carry no
/// instrumentable code of their own.
#[derive(Debug, Clone, Default)]
pub struct GlobalIgnores {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl GlobalIgnores {
    /// Build from configured exclude patterns.
    #[must_use]
    pub fn new<I, S>(excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ignores = Self::default();
        for pattern in excludes {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => ignores.prefixes.push(prefix.to_string()),
                None => {
                    ignores.exact.insert(pattern.to_string());
                }
            }
        }
        ignores
    }

    /// Whether `class_name` must not be instrumented.
    #[must_use]
    pub fn is_ignored(&self, class_name: &str) -> bool {
        class_name.contains(LAMBDA_MARKER)
            || self.exact.contains(class_name)
            || self
                .prefixes
                .iter()
                .any(|prefix| class_name.starts_with(prefix.as_str()))
    }
}
