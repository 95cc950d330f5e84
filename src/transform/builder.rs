use std::fmt;

/// One modification requested by a transform step.
///
/// The core does not rewrite bytecode itself; it accumulates edits and hands them to the
/// [`crate::host::BytecodeEngine`] for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassEdit {
    /// Make helper classes available to the target loader.
    InjectHelpers {
        /// Requesting module.
        module: String,
        /// Helper class names.
        helpers: Vec<String>,
    },
    /// Rewrite context-store lookups in the class to use injected fields.
    RewriteContextAccess {
        /// Requesting module.
        module: String,
        /// `(key type, value type)` stores.
        stores: Vec<(String, String)>,
    },
    /// Add a context-store field to the class.
    InjectContextField {
        /// Key type that receives the field.
        key: String,
        /// Stored value type.
        value: String,
    },
    /// Wrap a method with advice.
    Advice {
        /// Requesting module.
        module: String,
        /// Method name and descriptor.
        method: String,
        /// Advice class.
        advice_class: String,
    },
    /// Edit produced by a custom transform.
    Custom {
        /// Requesting module.
        module: String,
        /// Free-form description understood by the engine.
        detail: String,
    },
}

impl fmt::Display for ClassEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassEdit::InjectHelpers { module, helpers } => {
                write!(f, "helpers[{module}] {}", helpers.join(","))
            }
            ClassEdit::RewriteContextAccess { module, stores } => {
                write!(f, "context-rewrite[{module}]")?;
                for (key, value) in stores {
                    write!(f, " {key}->{value}")?;
                }
                Ok(())
            }
            ClassEdit::InjectContextField { key, value } => {
                write!(f, "context-field {key}->{value}")
            }
            ClassEdit::Advice {
                module,
                method,
                advice_class,
            } => write!(f, "advice[{module}] {method} {advice_class}"),
            ClassEdit::Custom { module, detail } => write!(f, "custom[{module}] {detail}"),
        }
    }
}

/// Position in a [`ClassBuilder`]'s edit list to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// The evolving representation of one class, threaded through every matched module's
/// transform stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBuilder {
    class_name: String,
    edits: Vec<ClassEdit>,
}

impl ClassBuilder {
    /// Creates a builder with no edits.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            edits: Vec::new(),
        }
    }

    /// Name of the class being built.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Append an edit.
    pub fn push(&mut self, edit: ClassEdit) {
        self.edits.push(edit);
    }

    /// Edits in application order.
    #[must_use]
    pub fn edits(&self) -> &[ClassEdit] {
        &self.edits
    }

    /// Returns `true` if no edit was made.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Remember the current state.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.edits.len())
    }

    /// Discard every edit made since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.edits.truncate(checkpoint.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_rollback() {
        let mut builder = ClassBuilder::new("com.foo.Bar");
        builder.push(ClassEdit::InjectContextField {
            key: "com.foo.Bar".into(),
            value: "x.Span".into(),
        });
        let checkpoint = builder.checkpoint();
        builder.push(ClassEdit::Custom {
            module: "m".into(),
            detail: "one".into(),
        });
        builder.push(ClassEdit::Custom {
            module: "m".into(),
            detail: "two".into(),
        });

        builder.rollback(checkpoint);
        assert_eq!(builder.edits().len(), 1);
        assert_eq!(builder.class_name(), "com.foo.Bar");
    }

    #[test]
    fn display() {
        let edit = ClassEdit::RewriteContextAccess {
            module: "servlet".into(),
            stores: vec![("a.Req".into(), "b.Span".into())],
        };
        assert_eq!(edit.to_string(), "context-rewrite[servlet] a.Req->b.Span");

        let edit = ClassEdit::Advice {
            module: "servlet".into(),
            method: "service()V".into(),
            advice_class: "x.Advice".into(),
        };
        assert_eq!(edit.to_string(), "advice[servlet] service()V x.Advice");
    }
}
