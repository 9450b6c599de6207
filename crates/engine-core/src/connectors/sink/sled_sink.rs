use super::{PendingMutations, StorageSink};
use crate::error::SinkError;
use async_trait::async_trait;
use model::{core::identifiers::TableName, mutation::Entry};
use std::path::Path;
use tracing::debug;

/// Sink persisting mutations into a sled database, one tree per table.
///
/// Cells are stored under `u32 BE key length ‖ key ‖ column`, so a prefix scan
/// over the first two parts yields every column of a key. Clones share the
/// database but are closed independently.
#[derive(Clone)]
pub struct SledSink {
    db: sled::Db,
    closed: bool,
}

impl SledSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let db = sled::open(path)?;
        Ok(Self { db, closed: false })
    }

    #[inline]
    fn key_prefix(key: &[u8]) -> Result<Vec<u8>, SinkError> {
        let len = u32::try_from(key.len())
            .map_err(|_| SinkError::Rejected(format!("key of {} bytes is too long", key.len())))?;
        let mut prefix = Vec::with_capacity(4 + key.len());
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(key);
        Ok(prefix)
    }

    #[inline]
    fn cell_key(prefix: &[u8], column: &[u8]) -> Vec<u8> {
        let mut cell = Vec::with_capacity(prefix.len() + column.len());
        cell.extend_from_slice(prefix);
        cell.extend_from_slice(column);
        cell
    }

    /// Reads a single cell back.
    pub fn get(
        &self,
        table: &TableName,
        key: &[u8],
        column: &[u8],
    ) -> Result<Option<Vec<u8>>, SinkError> {
        let tree = self.db.open_tree(table.as_str())?;
        let cell = Self::cell_key(&Self::key_prefix(key)?, column);
        Ok(tree.get(cell)?.map(|v| v.to_vec()))
    }

    /// All cells stored under `key`, ordered by column.
    pub fn entries(&self, table: &TableName, key: &[u8]) -> Result<Vec<Entry>, SinkError> {
        let tree = self.db.open_tree(table.as_str())?;
        let prefix = Self::key_prefix(key)?;
        tree.scan_prefix(&prefix)
            .map(|cell| -> Result<Entry, SinkError> {
                let (cell, value) = cell?;
                Ok(Entry::new(&cell[prefix.len()..], value.to_vec()))
            })
            .collect()
    }
}

#[async_trait]
impl StorageSink for SledSink {
    async fn accept(
        &mut self,
        table: &TableName,
        mutations: &PendingMutations,
    ) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        let tree = self.db.open_tree(table.as_str())?;
        let mut batch = sled::Batch::default();
        let mut cells = 0usize;

        for (key, mutation) in mutations {
            let prefix = Self::key_prefix(key.as_bytes())?;
            for deletion in mutation.deletions() {
                batch.remove(Self::cell_key(&prefix, &deletion.column));
                cells += 1;
            }
            for addition in mutation.additions() {
                batch.insert(
                    Self::cell_key(&prefix, &addition.column),
                    addition.value.as_slice(),
                );
                cells += 1;
            }
        }

        tree.apply_batch(batch)?;
        debug!(table = %table, keys = mutations.len(), cells, "Applied batch to sled tree");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let bytes = self.db.flush_async().await?;
        debug!(bytes, "Flushed sled database");
        Ok(())
    }

    fn name(&self) -> &str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::mutation::{KeyMutation, StoreKey};
    use std::collections::HashMap;

    #[tokio::test]
    async fn persists_additions_and_applies_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let table = TableName::new("edgestore");

        let mut sink = SledSink::open(dir.path()).unwrap();
        let first = HashMap::from([(
            StoreKey::from("person:1"),
            KeyMutation::additions_only(vec![
                Entry::new("p:name", "ada"),
                Entry::new("p:age", "36"),
            ]),
        )]);
        sink.accept(&table, &first).await.unwrap();

        let second = HashMap::from([(
            StoreKey::from("person:1"),
            KeyMutation::new(
                vec![Entry::new("l:Person", "")],
                vec![Entry::column_only("p:age")],
            ),
        )]);
        sink.accept(&table, &second).await.unwrap();
        sink.close().await.unwrap();

        let columns: Vec<Vec<u8>> = sink
            .entries(&table, b"person:1")
            .unwrap()
            .into_iter()
            .map(|e| e.column)
            .collect();
        assert_eq!(columns, vec![b"l:Person".to_vec(), b"p:name".to_vec()]);
        assert_eq!(
            sink.get(&table, b"person:1", b"p:name").unwrap(),
            Some(b"ada".to_vec())
        );
    }

    #[tokio::test]
    async fn key_prefix_does_not_leak_into_longer_keys() {
        let dir = tempfile::tempdir().unwrap();
        let table = TableName::new("t");
        let mut sink = SledSink::open(dir.path()).unwrap();

        let pending = HashMap::from([
            (
                StoreKey::from("a"),
                KeyMutation::additions_only(vec![Entry::new("x", "1")]),
            ),
            (
                StoreKey::from("ab"),
                KeyMutation::additions_only(vec![Entry::new("y", "2")]),
            ),
        ]);
        sink.accept(&table, &pending).await.unwrap();

        assert_eq!(sink.entries(&table, b"a").unwrap().len(), 1);
        assert_eq!(sink.entries(&table, b"ab").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_writes_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SledSink::open(dir.path()).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        let err = sink
            .accept(&TableName::new("t"), &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}
