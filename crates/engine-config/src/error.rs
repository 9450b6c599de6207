use thiserror::Error;

/// Errors raised while loading or validating import settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("Failed to read settings from '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid JSON or has unknown fields.
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its allowed range.
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl SettingsError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
