//! Error types for config entries.

use thiserror::Error;

/// Result type alias for config entry operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating config entries.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {kind} {name:?}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("failed to read entries file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML entries: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON entries: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported entries file format: {0}")]
    UnsupportedFormat(String),
}

impl ConfigError {
    pub(crate) fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
