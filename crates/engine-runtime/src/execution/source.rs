use async_trait::async_trait;
use engine_core::{
    error::{InputError, StepError},
    pool::BatchPool,
};
use engine_processing::{input::Header, stage::BatchSource};
use model::records::{batch::RowBatch, row::RawRow};
use std::{fs::File, path::Path, sync::Arc};

/// Reads a CSV file with a typed header row into batches of raw rows.
///
/// Row buffers are drawn from a pool the parse step refills, so a steady
/// state run allocates no new batches.
pub struct CsvBatchSource {
    reader: csv::Reader<File>,
    header: Header,
    description: String,
    batch_size: usize,
    pool: Arc<BatchPool<RowBatch>>,
    record: csv::StringRecord,
    done: bool,
}

impl CsvBatchSource {
    pub fn open(
        path: impl AsRef<Path>,
        batch_size: usize,
        pool: Arc<BatchPool<RowBatch>>,
    ) -> Result<Self, crate::error::ImportRunError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let header = Header::parse(&columns)?;

        Ok(Self {
            reader,
            header,
            description: path.display().to_string(),
            batch_size: batch_size.max(1),
            pool,
            record: csv::StringRecord::new(),
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Name of the file, used in skip reports.
    pub fn description(&self) -> &str {
        &self.description
    }

    fn read_batch(&mut self) -> Result<Option<RowBatch>, InputError> {
        if self.done {
            return Ok(None);
        }

        let mut batch = self.pool.acquire();
        while batch.len() < self.batch_size {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| InputError::Read(format!("{}: {e}", self.description)))?;
            if !more {
                self.done = true;
                break;
            }
            let line = self.record.position().map_or(0, |p| p.line());
            batch.push(RawRow::new(
                line,
                self.record.iter().map(str::to_string).collect(),
            ));
        }

        if batch.is_empty() {
            self.pool.release(batch);
            return Ok(None);
        }
        Ok(Some(batch))
    }
}

#[async_trait]
impl BatchSource<RowBatch> for CsvBatchSource {
    async fn next_batch(&mut self) -> Result<Option<RowBatch>, StepError> {
        Ok(self.read_batch()?)
    }
}
