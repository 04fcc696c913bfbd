//! Gateway synthesis error types.

use meshchain_compiler::ChainError;
use thiserror::Error;

/// Result type alias for gateway synthesis.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid {kind} {name:?}: {reason}")]
    InvalidRoute {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("compiling synthesized chain {service:?}: {source}")]
    Compile {
        service: String,
        #[source]
        source: ChainError,
    },
}

impl GatewayError {
    pub(crate) fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoute {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
