use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};
use tracing::debug;

mod flush;
mod step;

pub use flush::{FlushPolicy, RetrySettings};
pub use step::StepSettings;

/// Settings of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSettings {
    /// Accumulated mutations that trigger a flush
    pub chunk_size: usize,
    pub flush_policy: FlushPolicy,
    /// Input records per ticket
    pub batch_size: usize,
    /// Storage table entities are written to
    pub table: String,
    /// How often the stage checks for completion
    pub poll_interval_ms: u64,
    /// Skipped records tolerated before the run is aborted
    pub max_bad_entries: u64,
    pub flush_retry: RetrySettings,
    /// Per-step sizing, keyed by step name
    pub steps: BTreeMap<String, StepSettings>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            flush_policy: FlushPolicy::default(),
            batch_size: 1000,
            table: "edgestore".to_string(),
            poll_interval_ms: 10,
            max_bad_entries: 1000,
            flush_retry: RetrySettings::default(),
            steps: BTreeMap::new(),
        }
    }
}

impl ImportSettings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: ImportSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded import settings");
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size == 0 {
            return Err(SettingsError::invalid("chunk_size", "must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(SettingsError::invalid("batch_size", "must be greater than 0"));
        }
        if self.table.trim().is_empty() {
            return Err(SettingsError::invalid("table", "must not be empty"));
        }
        if self.flush_retry.max_attempts == 0 {
            return Err(SettingsError::invalid(
                "flush_retry.max_attempts",
                "must be at least 1",
            ));
        }
        for (name, step) in &self.steps {
            if step.workers == 0 {
                return Err(SettingsError::invalid(
                    format!("steps.{name}.workers"),
                    "must be greater than 0",
                ));
            }
            if step.work_ahead == 0 {
                return Err(SettingsError::invalid(
                    format!("steps.{name}.work_ahead"),
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }

    /// Sizing for `name`, falling back to the defaults.
    pub fn step(&self, name: &str) -> StepSettings {
        self.steps.get(name).copied().unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_max_bad_entries(mut self, max: u64) -> Self {
        self.max_bad_entries = max;
        self
    }

    pub fn with_flush_retry(mut self, retry: RetrySettings) -> Self {
        self.flush_retry = retry;
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, step: StepSettings) -> Self {
        self.steps.insert(name.into(), step);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = ImportSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, ImportSettings::default());
        assert_eq!(settings.chunk_size, 1024);
        assert_eq!(settings.step("parse"), StepSettings::default());
    }

    #[test]
    fn step_sizing_is_read_per_name() {
        let settings = ImportSettings::from_json_str(
            r#"{
                "chunk_size": 10,
                "flush_policy": "per_table",
                "steps": { "encode": { "workers": 8, "ordered": false } }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.flush_policy, FlushPolicy::PerTable);
        let encode = settings.step("encode");
        assert_eq!(encode.workers, 8);
        assert_eq!(encode.work_ahead, 16);
        assert!(!encode.ordered);
    }

    #[test]
    fn rejects_zero_sizes() {
        let err = ImportSettings::from_json_str(r#"{ "chunk_size": 0 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { ref field, .. } if field == "chunk_size"));

        let err = ImportSettings::default()
            .with_step("parse", StepSettings::default().with_workers(0))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("steps.parse.workers"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ImportSettings::from_json_str(r#"{ "chunk": 5 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "table": "graph", "batch_size": 50 }}"#).unwrap();

        let settings = ImportSettings::from_path(file.path()).unwrap();
        assert_eq!(settings.table, "graph");
        assert_eq!(settings.batch_size, 50);

        let missing = ImportSettings::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(SettingsError::Io { .. })));
    }
}
