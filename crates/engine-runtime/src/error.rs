use engine_config::SettingsError;
use engine_core::error::{ImportError, InputError, SinkError};
use engine_processing::stage::StageFailure;
use thiserror::Error;

/// Top-level errors of an import run.
#[derive(Debug, Error)]
pub enum ImportRunError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// The input file could not be opened or its header read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The pipeline panicked; carries the statistics gathered so far.
    #[error(transparent)]
    Stage(#[from] Box<StageFailure>),

    /// The final flush or the sink close failed after the stage succeeded.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

impl ImportRunError {
    pub fn is_sink_failure(&self) -> bool {
        match self {
            ImportRunError::Sink(_) => true,
            ImportRunError::Import(e) => e.is_sink_failure(),
            ImportRunError::Stage(f) => f.error.is_sink_failure(),
            _ => false,
        }
    }
}
