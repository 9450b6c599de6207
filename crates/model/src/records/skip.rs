use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an input record was left out of the import.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("invalid value '{raw}' in field {field} ({entry}): {message}")]
    InvalidValue {
        field: usize,
        entry: String,
        raw: String,
        message: String,
    },

    #[error("{count} extra column(s) beyond the header")]
    ExtraColumns { count: usize },

    #[error("{0} has no identifier")]
    MissingIdentifier(String),

    #[error("relationship is missing its {0} endpoint")]
    MissingEndpoint(String),

    #[error("relationship has no type")]
    MissingType,
}

/// A skipped (or partially imported) record, as collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReport {
    pub source: String,
    pub line: u64,
    pub reason: SkipReason,
}

impl SkipReport {
    pub fn new(source: impl Into<String>, line: u64, reason: SkipReason) -> Self {
        SkipReport {
            source: source.into(),
            line,
            reason,
        }
    }
}

impl fmt::Display for SkipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.source, self.line, self.reason)
    }
}
