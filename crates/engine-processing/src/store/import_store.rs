use engine_config::{FlushPolicy, ImportSettings};
use engine_core::{
    connectors::sink::{PendingMutations, StorageSink},
    error::ImportError,
    retry::{RetryPolicy, classify_sink_error},
};
use model::{
    core::identifiers::TableName,
    mutation::{Entry, KeyMutation, MutationBatch, StoreKey},
};
use std::{collections::BTreeMap, time::Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TablePending {
    mutations: PendingMutations,
    count: usize,
}

/// Accumulates per-key mutations and flushes them to a sink in chunks.
///
/// Mutations for a key already pending are merged by concatenation. Once the
/// running count of pending operations reaches the chunk size the pending set
/// is flushed before `mutate` returns. A failed flush leaves the pending set
/// untouched. A failed threshold flush is only logged and is tried again once
/// another chunk has accumulated; `flush` and `close` report sink failures.
pub struct ImportStore<S> {
    table: TableName,
    sink: S,
    chunk_size: usize,
    policy: FlushPolicy,
    retry: RetryPolicy,
    pending: BTreeMap<TableName, TablePending>,
    total: usize,
    /// Operations still to accumulate before a failed threshold flush is
    /// attempted again.
    flush_hold: usize,
    flushes: u64,
    open: bool,
}

impl<S: StorageSink> ImportStore<S> {
    pub fn new(sink: S, table: impl Into<TableName>, chunk_size: usize) -> Self {
        Self {
            table: table.into(),
            sink,
            chunk_size: chunk_size.max(1),
            policy: FlushPolicy::default(),
            retry: RetryPolicy::default(),
            pending: BTreeMap::new(),
            total: 0,
            flush_hold: 0,
            flushes: 0,
            open: true,
        }
    }

    pub fn from_settings(sink: S, settings: &ImportSettings) -> Self {
        Self::new(sink, settings.table.as_str(), settings.chunk_size)
            .with_flush_policy(settings.flush_policy)
            .with_retry(settings.flush_retry.policy())
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Default table of this store.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Running count of pending operations over all tables.
    pub fn pending_mutations(&self) -> usize {
        self.total
    }

    /// Distinct keys pending over all tables.
    pub fn pending_keys(&self) -> usize {
        self.pending.values().map(|t| t.mutations.len()).sum()
    }

    pub fn pending_in(&self, table: &TableName) -> Option<&PendingMutations> {
        self.pending.get(table).map(|t| &t.mutations)
    }

    /// Successful sink flushes so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn mutate(
        &mut self,
        key: StoreKey,
        additions: Vec<Entry>,
        deletions: Vec<Entry>,
    ) -> Result<(), ImportError> {
        let table = self.table.clone();
        self.mutate_in(&table, key, additions, deletions).await
    }

    /// Additions-only shorthand used for edge lists.
    pub async fn mutate_edges(
        &mut self,
        key: StoreKey,
        additions: Vec<Entry>,
    ) -> Result<(), ImportError> {
        self.mutate(key, additions, Vec::new()).await
    }

    pub async fn mutate_in(
        &mut self,
        table: &TableName,
        key: StoreKey,
        additions: Vec<Entry>,
        deletions: Vec<Entry>,
    ) -> Result<(), ImportError> {
        if !self.open {
            return Err(ImportError::Closed(table.clone()));
        }
        if key.is_empty() {
            return Err(ImportError::EmptyKey);
        }
        if additions.is_empty() && deletions.is_empty() {
            return Ok(());
        }

        let ops = additions.len() + deletions.len();
        let pending = self.pending.entry(table.clone()).or_default();
        pending
            .mutations
            .entry(key)
            .or_default()
            .merge(KeyMutation::new(additions, deletions));
        pending.count += ops;
        let table_count = pending.count;
        self.total += ops;

        if self.flush_hold > 0 {
            self.flush_hold = self.flush_hold.saturating_sub(ops);
            return Ok(());
        }
        let flushed = match self.policy {
            FlushPolicy::SharedTotal if self.total >= self.chunk_size => self.flush().await,
            FlushPolicy::PerTable if table_count >= self.chunk_size => {
                self.flush_table(table).await
            }
            _ => return Ok(()),
        };
        if let Err(e) = flushed {
            self.flush_hold = self.chunk_size;
            warn!(
                error = %e,
                pending = self.total,
                "Threshold flush failed, keeping mutations for the next flush"
            );
        }
        Ok(())
    }

    /// Merges every mutation of `batch` into the default table.
    pub async fn apply(&mut self, batch: MutationBatch) -> Result<(), ImportError> {
        for (key, mutation) in batch {
            let (additions, deletions) = mutation.into_parts();
            self.mutate(key, additions, deletions).await?;
        }
        Ok(())
    }

    /// Flushes every table with pending mutations, in table name order. Stops
    /// at the first table whose flush fails; it and the tables after it stay
    /// pending.
    pub async fn flush(&mut self) -> Result<(), ImportError> {
        let tables: Vec<TableName> = self.pending.keys().cloned().collect();
        for table in &tables {
            self.flush_table(table).await?;
        }
        Ok(())
    }

    async fn flush_table(&mut self, table: &TableName) -> Result<(), ImportError> {
        let Some(pending) = self.pending.get(table) else {
            return Ok(());
        };
        if pending.mutations.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let Err(err) = self.sink.accept(table, &pending.mutations).await else {
                break;
            };
            match self.retry.next_delay(attempts, classify_sink_error(&err)) {
                Some(delay) => {
                    warn!(
                        table = %table,
                        sink = self.sink.name(),
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Flush failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ImportError::Flush {
                        table: table.clone(),
                        attempts,
                        source: err,
                    });
                }
            }
        }

        if let Some(done) = self.pending.remove(table) {
            self.total = self.total.saturating_sub(done.count);
            self.flush_hold = 0;
            self.flushes += 1;
            info!(
                table = %table,
                sink = self.sink.name(),
                keys = done.mutations.len(),
                mutations = done.count,
                attempts,
                duration_ms = started.elapsed().as_millis(),
                "Flush completed"
            );
        }
        Ok(())
    }

    /// Flushes the remainder and closes the sink. Later calls do nothing.
    pub async fn close(&mut self) -> Result<(), ImportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let flushed = self.flush().await;
        let closed = self.sink.close().await.map_err(ImportError::SinkClose);
        debug!(
            table = %self.table,
            flushes = self.flushes,
            left = self.total,
            held = self.flush_hold,
            "Import store closed"
        );
        flushed?;
        closed
    }
}
