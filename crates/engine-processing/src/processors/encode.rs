use crate::{
    encode::{EncodeError, Encoder},
    input::BadCollector,
    step::BatchProcessor,
};
use async_trait::async_trait;
use engine_core::{Ticket, error::StepError};
use model::{
    mutation::MutationBatch,
    records::{batch::EntityBatch, skip::SkipReport},
};
use std::sync::Arc;

/// Encodes a batch of entities into store mutations.
pub struct EncodeProcessor {
    encoder: Encoder,
    source: String,
    collector: Arc<BadCollector>,
}

impl EncodeProcessor {
    pub fn new(encoder: Encoder, source: impl Into<String>, collector: Arc<BadCollector>) -> Self {
        Self {
            encoder,
            source: source.into(),
            collector,
        }
    }
}

#[async_trait]
impl BatchProcessor<EntityBatch, MutationBatch> for EncodeProcessor {
    async fn process(
        &self,
        _ticket: Ticket,
        entities: &mut EntityBatch,
    ) -> Result<MutationBatch, StepError> {
        let mut mutations = MutationBatch::with_capacity(entities.len());

        for entity in entities.drain(..) {
            match self.encoder.encode(&entity) {
                Ok(encoded) => {
                    for (key, mutation) in encoded {
                        mutations.push(key, mutation);
                    }
                }
                Err(EncodeError::Skip(reason)) => {
                    self.collector
                        .collect(SkipReport::new(self.source.as_str(), entity.line, reason))?;
                }
                Err(e @ EncodeError::Serialize(_)) => {
                    return Err(StepError::processing("encode", e.to_string()));
                }
            }
        }
        Ok(mutations)
    }
}
