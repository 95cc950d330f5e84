//! Parsed view of a class, as supplied by the [`crate::host::BytecodeEngine`].

/// A method declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Method name, `<init>` for constructors.
    pub name: String,
    /// Type descriptor, e.g. `(Ljava/lang/String;)V`.
    pub descriptor: String,
    /// Compiler-generated method.
    pub synthetic: bool,
}

impl MethodDescriptor {
    /// Creates a non-synthetic method.
    #[must_use]
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            synthetic: false,
        }
    }

    /// Creates a synthetic method.
    #[must_use]
    pub fn synthetic(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            synthetic: true,
            ..Self::new(name, descriptor)
        }
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A class as seen by type matchers.
///
/// The super class chain and the interface set are the full closures computed by the host
/// type pool, so hierarchy predicates never need to resolve further types.
///
/// # Example
///
/// ```rust
/// use classweave::matcher::{ClassDescriptor, MethodDescriptor};
///
/// let class = ClassDescriptor::new("com.foo.Bar")
///     .extends("com.foo.Base")
///     .implements("java.lang.Runnable")
///     .method(MethodDescriptor::new("run", "()V"));
///
/// assert!(class.has_super_type("com.foo.Base"));
/// assert!(class.has_super_type("java.lang.Runnable"));
/// assert_eq!(class.super_class(), Some("com.foo.Base"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// Binary class name, e.g. `com.foo.Bar`.
    pub name: String,
    /// Super class chain, direct super class first.
    pub super_classes: Vec<String>,
    /// Every interface implemented directly or inherited.
    pub interfaces: Vec<String>,
    /// Annotation type names declared on the class.
    pub annotations: Vec<String>,
    /// Whether the class is an interface.
    pub is_interface: bool,
    /// Declared methods.
    pub methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    /// Creates a descriptor with no supertypes, annotations or methods.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a class to the super class chain.
    #[must_use]
    pub fn extends(mut self, super_class: impl Into<String>) -> Self {
        self.super_classes.push(super_class.into());
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Adds a class annotation.
    #[must_use]
    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// Marks the class as an interface.
    #[must_use]
    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    /// Adds a declared method.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// The direct super class, if any.
    #[must_use]
    pub fn super_class(&self) -> Option<&str> {
        self.super_classes.first().map(String::as_str)
    }

    /// Whether `name` is this class, one of its super classes or one of its interfaces.
    #[must_use]
    pub fn has_super_type(&self, name: &str) -> bool {
        self.name == name || self.extends_class(name) || self.implements_interface(name)
    }

    /// Whether `name` appears in the super class chain.
    #[must_use]
    pub fn extends_class(&self, name: &str) -> bool {
        self.super_classes.iter().any(|s| s == name)
    }

    /// Whether `name` is among the implemented interfaces.
    #[must_use]
    pub fn implements_interface(&self, name: &str) -> bool {
        self.interfaces.iter().any(|s| s == name)
    }

    /// Whether the class declares annotation `name`.
    #[must_use]
    pub fn is_annotated_with(&self, name: &str) -> bool {
        self.annotations.iter().any(|s| s == name)
    }
}
