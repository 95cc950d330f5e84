use std::sync::Arc;

use crate::{
    host::{BytecodeEngine, ClassFileTransformer, ClassLoadEvent},
    installer::{
        agent::{guarded, transform_event},
        CombiningPipeline,
    },
    matcher::{CombiningMatcher, GlobalIgnores},
    module::ModuleId,
    transform::SplittingTransformer,
    Result,
};

/// Host transformer for a single id of the legacy strategy.
///
/// Each instance runs its own matching pass restricted to one id, using the same
/// recorders, hint cache, deferral state and transform stack as the combined pipeline.
/// Registered with the host in ascending id order, the legacy transformers produce the
/// same edits in the same order as the single combining transformer.
pub struct LegacyTransformer {
    id: ModuleId,
    matcher: CombiningMatcher,
    transformer: Arc<SplittingTransformer>,
    engine: Arc<dyn BytecodeEngine>,
    ignores: Arc<GlobalIgnores>,
}

impl LegacyTransformer {
    /// One transformer per id of `pipeline`, lowest id first.
    #[must_use]
    pub fn split(
        pipeline: &CombiningPipeline,
        engine: &Arc<dyn BytecodeEngine>,
        ignores: &Arc<GlobalIgnores>,
    ) -> Vec<LegacyTransformer> {
        pipeline
            .transformer()
            .table()
            .ids()
            .map(|id| LegacyTransformer {
                id,
                matcher: pipeline.matcher().for_module(id),
                transformer: pipeline.transformer().clone(),
                engine: engine.clone(),
                ignores: ignores.clone(),
            })
            .collect()
    }

    /// The id this transformer applies.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// The per-id matcher.
    #[must_use]
    pub fn matcher(&self) -> &CombiningMatcher {
        &self.matcher
    }
}

impl ClassFileTransformer for LegacyTransformer {
    fn transform(&self, event: &ClassLoadEvent) -> Result<Option<Vec<u8>>> {
        guarded(&event.class_name, || {
            transform_event(
                &self.matcher,
                &self.transformer,
                self.engine.as_ref(),
                &self.ignores,
                event,
            )
        })
    }
}
