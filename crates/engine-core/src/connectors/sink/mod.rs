use crate::error::SinkError;
use async_trait::async_trait;
use model::{
    core::identifiers::TableName,
    mutation::{KeyMutation, StoreKey},
};
use std::collections::HashMap;

pub mod memory;
pub mod sled_sink;

/// Pending mutations of one table as handed to a sink in a single flush.
pub type PendingMutations = HashMap<StoreKey, KeyMutation>;

/// Writer the import store flushes accumulated mutations into.
///
/// `accept` receives the whole pending set of a table at once and must either
/// persist all of it or fail; the caller keeps the set and may offer it again.
#[async_trait]
pub trait StorageSink: Send {
    async fn accept(
        &mut self,
        table: &TableName,
        mutations: &PendingMutations,
    ) -> Result<(), SinkError>;

    /// Makes everything accepted so far durable. Called once.
    async fn close(&mut self) -> Result<(), SinkError>;

    fn name(&self) -> &str {
        "sink"
    }
}

#[async_trait]
impl<S: StorageSink + ?Sized> StorageSink for Box<S> {
    async fn accept(
        &mut self,
        table: &TableName,
        mutations: &PendingMutations,
    ) -> Result<(), SinkError> {
        (**self).accept(table, mutations).await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        (**self).close().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
