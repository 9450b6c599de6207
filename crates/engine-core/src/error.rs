use crate::ticket::Ticket;
use model::core::identifiers::TableName;
use thiserror::Error;

/// Failures raised by a storage sink. Kept apart from pipeline errors so a
/// caller can tell "the sink rejected data" from "the pipeline is broken".
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Sink rejected data: {0}")]
    Rejected(String),

    #[error("Sink is closed")]
    Closed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Pipeline halted while waiting on queue")]
    Halted,

    #[error("Queue no longer accepts batches")]
    Closed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Ticket {ticket} already seen (next expected {expected})")]
pub struct TicketError {
    pub ticket: Ticket,
    pub expected: Ticket,
}

/// Errors raised by the mutation accumulator.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Mutation key must not be empty")]
    EmptyKey,

    #[error("Import store for table '{0}' is closed")]
    Closed(TableName),

    #[error("Flush of table '{table}' failed after {attempts} attempt(s): {source}")]
    Flush {
        table: TableName,
        attempts: usize,
        #[source]
        source: SinkError,
    },

    #[error("Failed to close sink: {0}")]
    SinkClose(#[source] SinkError),
}

impl ImportError {
    /// Whether the failure originated in the sink rather than in the caller.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, ImportError::Flush { .. } | ImportError::SinkClose(_))
    }
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Invalid header: {0}")]
    Header(String),

    #[error("Too many bad entries: {seen} exceeds tolerance of {tolerance}")]
    TooManyBadEntries { seen: u64, tolerance: u64 },

    #[error("Failed to read input: {0}")]
    Read(String),
}

/// Errors raised by pipeline steps. Any of these reaching a worker panics the
/// step and, through it, the whole stage.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Step '{0}' received a batch before it was started")]
    NotStarted(String),

    #[error("Step '{0}' was already started")]
    AlreadyStarted(String),

    #[error("Step '{0}' received a batch after end of upstream")]
    UpstreamEnded(String),

    #[error("Step '{step}': {source}")]
    DuplicateTicket {
        step: String,
        #[source]
        source: TicketError,
    },

    #[error("Step '{step}' ended with {held} batch(es) still waiting for ticket {expected}")]
    TicketGap {
        step: String,
        held: usize,
        expected: Ticket,
    },

    #[error("Pipeline halted")]
    Halted,

    #[error("Step '{step}' failed: {message}")]
    Processing { step: String, message: String },

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Worker task of step '{step}' failed: {source}")]
    Worker {
        step: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl StepError {
    pub fn processing(step: impl Into<String>, message: impl Into<String>) -> Self {
        StepError::Processing {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Secondary errors caused by another step's panic halting the pipeline.
    pub fn is_halt(&self) -> bool {
        matches!(self, StepError::Halted)
    }

    pub fn is_sink_failure(&self) -> bool {
        matches!(self, StepError::Import(e) if e.is_sink_failure())
    }
}
