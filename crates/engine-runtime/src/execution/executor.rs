use crate::{error::ImportRunError, execution::source::CsvBatchSource};
use engine_config::ImportSettings;
use engine_core::{connectors::sink::StorageSink, pool::BatchPool};
use engine_processing::{
    encode::Encoder,
    input::{BadCollector, EntityParser},
    processors::{
        ENCODE_STEP, EncodeProcessor, IMPORT_STEP, ImportProcessor, PARSE_STEP, ParseProcessor,
    },
    stage::{Stage, StageBuilder, StageReport},
    step::{ProcessorStep, flags_for},
    store::ImportStore,
};
use futures::lock::Mutex;
use model::records::{batch::RowBatch, skip::SkipReport};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of a successful import run.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub stage: StageReport,
    /// Successful sink flushes, the final one included.
    pub flushes: u64,
    /// Records skipped or only partly imported.
    pub skipped: Vec<SkipReport>,
}

/// Imports the CSV file at `csv_path` into `sink`: rows are parsed, encoded
/// and merged into an import store, which is closed once the stage is done.
pub async fn run<S>(
    settings: ImportSettings,
    csv_path: impl AsRef<Path>,
    sink: S,
    cancel: CancellationToken,
) -> Result<ImportReport, ImportRunError>
where
    S: StorageSink + 'static,
{
    ImportExecutor::new(settings, csv_path.as_ref(), sink, cancel)?
        .execute()
        .await
}

struct ImportExecutor<S> {
    stage: Stage<RowBatch>,
    source: CsvBatchSource,
    store: Arc<Mutex<ImportStore<S>>>,
    collector: Arc<BadCollector>,
}

impl<S: StorageSink + 'static> ImportExecutor<S> {
    fn new(
        settings: ImportSettings,
        csv_path: &Path,
        sink: S,
        cancel: CancellationToken,
    ) -> Result<Self, ImportRunError> {
        settings.validate()?;

        let parse_settings = settings.step(PARSE_STEP);
        let encode_settings = settings.step(ENCODE_STEP);
        let import_settings = settings.step(IMPORT_STEP);

        // Enough buffers for every batch that can be queued or in flight.
        let pool = Arc::new(BatchPool::<RowBatch>::new(
            parse_settings.work_ahead + parse_settings.workers + 1,
        ));
        let source = CsvBatchSource::open(csv_path, settings.batch_size, pool.clone())?;
        let collector = Arc::new(BadCollector::new(settings.max_bad_entries));
        let store = Arc::new(Mutex::new(ImportStore::from_settings(sink, &settings)));

        let parser = EntityParser::new(source.header().clone(), source.description());
        let parse = Arc::new(
            ProcessorStep::new(
                PARSE_STEP,
                parse_settings,
                ParseProcessor::new(parser, collector.clone()),
            )
            .with_recycler(pool),
        );
        let encode = Arc::new(ProcessorStep::new(
            ENCODE_STEP,
            encode_settings,
            EncodeProcessor::new(Encoder::new(), source.description(), collector.clone()),
        ));
        let import = Arc::new(ProcessorStep::new(
            IMPORT_STEP,
            import_settings,
            ImportProcessor::new(store.clone()),
        ));

        let stage = StageBuilder::new("import", parse, flags_for(&parse_settings, true))
            .then(encode, flags_for(&encode_settings, false))
            .then::<_, ()>(import, flags_for(&import_settings, false))
            .poll_interval(settings.poll_interval())
            .cancel_on(&cancel)
            .build();

        info!(
            source = %source.description(),
            header = %source.header(),
            table = %settings.table,
            chunk_size = settings.chunk_size,
            batch_size = settings.batch_size,
            "Import prepared"
        );

        Ok(Self {
            stage,
            source,
            store,
            collector,
        })
    }

    async fn execute(self) -> Result<ImportReport, ImportRunError> {
        let ImportExecutor {
            stage,
            source,
            store,
            collector,
        } = self;

        let outcome = stage.execute(source).await;
        let mut store = store.lock().await;

        let report = match outcome {
            Ok(report) => report,
            Err(failure) => {
                // The pipeline is dead; still flush what made it through and
                // release the sink, but report the pipeline failure.
                if let Err(e) = store.close().await {
                    warn!(error = %e, "Closing import store after failed stage also failed");
                }
                error!(
                    error = %failure.error,
                    skipped = collector.count(),
                    "Import failed"
                );
                return Err(ImportRunError::Stage(Box::new(failure)));
            }
        };

        store.close().await?;
        info!(
            batches = report.batches,
            flushes = store.flush_count(),
            skipped = collector.count(),
            duration_ms = report.elapsed.as_millis(),
            "Import completed"
        );

        Ok(ImportReport {
            flushes: store.flush_count(),
            skipped: collector.reports(),
            stage: report,
        })
    }
}
