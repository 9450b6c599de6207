use crate::{step::BatchProcessor, store::ImportStore};
use async_trait::async_trait;
use engine_core::{Ticket, connectors::sink::StorageSink, error::StepError};
use futures::lock::Mutex;
use model::mutation::MutationBatch;
use std::sync::Arc;
use tracing::debug;

/// Terminal processor merging mutation batches into a shared import store.
pub struct ImportProcessor<S> {
    store: Arc<Mutex<ImportStore<S>>>,
}

impl<S> ImportProcessor<S> {
    pub fn new(store: Arc<Mutex<ImportStore<S>>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: StorageSink + 'static> BatchProcessor<MutationBatch, ()> for ImportProcessor<S> {
    async fn process(&self, ticket: Ticket, batch: &mut MutationBatch) -> Result<(), StepError> {
        let batch = std::mem::take(batch);
        let mutations = batch.total_mutations();

        // Held across mutate and any flush it triggers.
        let mut store = self.store.lock().await;
        store.apply(batch).await?;
        debug!(
            ticket,
            mutations,
            pending = store.pending_mutations(),
            "Applied mutation batch"
        );
        Ok(())
    }
}
