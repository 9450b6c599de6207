use crate::{
    input::{BadCollector, EntityParser},
    step::BatchProcessor,
};
use async_trait::async_trait;
use engine_core::{Ticket, error::StepError};
use model::records::{
    batch::{EntityBatch, RowBatch},
    skip::SkipReport,
};
use std::sync::Arc;
use tracing::debug;

/// Parses a batch of raw rows. Rows that fail go to the collector.
pub struct ParseProcessor {
    parser: EntityParser,
    collector: Arc<BadCollector>,
}

impl ParseProcessor {
    pub fn new(parser: EntityParser, collector: Arc<BadCollector>) -> Self {
        Self { parser, collector }
    }
}

#[async_trait]
impl BatchProcessor<RowBatch, EntityBatch> for ParseProcessor {
    async fn process(&self, ticket: Ticket, rows: &mut RowBatch) -> Result<EntityBatch, StepError> {
        let mut entities = EntityBatch::with_capacity(rows.len());

        for row in rows.drain(..) {
            if let Some(extra) = self.parser.extra_columns(&row) {
                self.collector
                    .collect(SkipReport::new(self.parser.source(), row.line, extra))?;
            }
            match self.parser.parse(&row) {
                Ok(entity) => entities.push(entity),
                Err(reason) => {
                    self.collector
                        .collect(SkipReport::new(self.parser.source(), row.line, reason))?;
                }
            }
        }

        debug!(ticket, entities = entities.len(), "Parsed batch");
        Ok(entities)
    }
}
