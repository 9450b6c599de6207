use super::{PendingMutations, StorageSink};
use crate::error::SinkError;
use async_trait::async_trait;
use model::{
    core::identifiers::TableName,
    mutation::{KeyMutation, StoreKey},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<TableName, HashMap<StoreKey, KeyMutation>>,
    flushes: Vec<(TableName, PendingMutations)>,
    accept_calls: usize,
    close_calls: usize,
    failures_left: usize,
}

/// Sink that keeps everything in memory. Clones share the same state, so a
/// test can hand one clone to the import store and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `accept` fail with an I/O error.
    pub fn fail_next_accepts(&self, n: usize) {
        self.lock().failures_left = n;
    }

    /// Successful flushes, in order, with the exact set each one carried.
    pub fn flushes(&self) -> Vec<(TableName, PendingMutations)> {
        self.lock().flushes.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes.len()
    }

    /// Calls to `accept`, including failed ones.
    pub fn accept_calls(&self) -> usize {
        self.lock().accept_calls
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_calls
    }

    /// Everything accepted for `table`, merged across flushes.
    pub fn table(&self, table: &TableName) -> HashMap<StoreKey, KeyMutation> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn key(&self, table: &TableName, key: &StoreKey) -> Option<KeyMutation> {
        self.lock()
            .tables
            .get(table)
            .and_then(|keys| keys.get(key))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn accept(
        &mut self,
        table: &TableName,
        mutations: &PendingMutations,
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.accept_calls += 1;

        if state.close_calls > 0 {
            return Err(SinkError::Closed);
        }
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(SinkError::Io(std::io::Error::other(
                "injected accept failure",
            )));
        }

        let stored = state.tables.entry(table.clone()).or_default();
        for (key, mutation) in mutations {
            stored
                .entry(key.clone())
                .or_default()
                .merge(mutation.clone());
        }
        state.flushes.push((table.clone(), mutations.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.lock().close_calls += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::mutation::Entry;

    fn pending(key: &str, column: &str) -> PendingMutations {
        HashMap::from([(
            StoreKey::from(key),
            KeyMutation::additions_only(vec![Entry::new(column, "v")]),
        )])
    }

    #[tokio::test]
    async fn clones_share_state() {
        let observer = MemorySink::new();
        let mut sink = observer.clone();
        let table = TableName::new("edges");

        sink.accept(&table, &pending("a", "c1")).await.unwrap();
        sink.accept(&table, &pending("a", "c2")).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(observer.flush_count(), 2);
        assert_eq!(observer.close_count(), 1);
        let merged = observer.key(&table, &StoreKey::from("a")).unwrap();
        assert_eq!(merged.additions().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let mut sink = MemorySink::new();
        sink.fail_next_accepts(1);
        let table = TableName::new("edges");

        let err = sink.accept(&table, &pending("a", "c")).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
        assert_eq!(sink.flush_count(), 0);

        sink.accept(&table, &pending("a", "c")).await.unwrap();
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.accept_calls(), 2);
    }
}
