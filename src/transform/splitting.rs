use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    host::LoaderRef,
    matcher::{ClassDescriptor, MatchSet},
    module::{InstrumentationStatus, ModuleId},
    transform::{ClassBuilder, TransformerTable},
    utils::panic_message,
    Error,
};

/// Applies the transform stacks of every matched module, in ascending id order.
///
/// Each module's stack runs against a checkpoint of the builder. A stack that fails or panics
/// is rolled back and reported as an [`Error::Transform`] of its module in the
/// [`InstrumentationStatus`]; the remaining matched modules still apply to the same class.
#[derive(Debug, Clone)]
pub struct SplittingTransformer {
    table: Arc<TransformerTable>,
    status: Arc<InstrumentationStatus>,
}

impl SplittingTransformer {
    /// Creates a transformer over `table`, reporting outcomes to `status`.
    #[must_use]
    pub fn new(table: Arc<TransformerTable>, status: Arc<InstrumentationStatus>) -> Self {
        Self { table, status }
    }

    /// Apply every module in `matched` to `builder`. Returns how many stacks applied cleanly.
    pub fn transform(
        &self,
        builder: &mut ClassBuilder,
        class: &ClassDescriptor,
        loader: Option<&LoaderRef>,
        matched: &MatchSet,
    ) -> usize {
        let mut applied = 0;

        for id in matched {
            let Some(stack) = self.table.get(id) else {
                debug!("No transform stack for module {id}, skipping {}", class.name);
                continue;
            };

            let checkpoint = builder.checkpoint();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| stack.apply(builder, class, loader)))
                    .unwrap_or_else(|payload| Err(Error::Error(panic_message(payload.as_ref()))))
                    .map_err(|e| transform_error(id, e));
            match outcome {
                Ok(()) => {
                    applied += 1;
                    self.status.record_applied(id);
                }
                Err(e) => {
                    builder.rollback(checkpoint);
                    warn!("Failed to apply {} to {}: {}", stack.module(), class.name, e);
                    self.status.record_failure(id, e.to_string());
                }
            }
        }

        applied
    }

    /// The stacks this transformer applies.
    #[must_use]
    pub fn table(&self) -> &Arc<TransformerTable> {
        &self.table
    }

    /// The status tracker failures are reported to.
    #[must_use]
    pub fn status(&self) -> &Arc<InstrumentationStatus> {
        &self.status
    }
}

fn transform_error(module: ModuleId, error: Error) -> Error {
    match error {
        Error::Transform { .. } => error,
        other => Error::Transform {
            module,
            message: other.to_string(),
        },
    }
}
