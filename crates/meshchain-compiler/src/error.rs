//! Compiler error types.

use thiserror::Error;

/// Result type alias for compilation.
pub type ChainResult<T> = Result<T, ChainError>;

/// A semantic contradiction in the configuration being compiled.
///
/// Expected while validating proposed entries. Seeing one for entries that
/// were already accepted means earlier validation let something through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigEntryGraphError {
    pub message: String,
}

impl ConfigEntryGraphError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned by [`compile`](crate::compile).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Graph(#[from] ConfigEntryGraphError),

    #[error("compilation failed: {0}")]
    Internal(String),

    #[error("cannot create customization hash key: {0}")]
    CustomizationHash(#[from] serde_json::Error),
}

impl ChainError {
    pub(crate) fn graph(message: impl Into<String>) -> Self {
        Self::Graph(ConfigEntryGraphError::new(message))
    }

    pub fn is_graph_error(&self) -> bool {
        matches!(self, ChainError::Graph(_))
    }

    pub fn as_graph_error(&self) -> Option<&ConfigEntryGraphError> {
        match self {
            ChainError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_errors_are_distinguishable() {
        let err = ChainError::graph("detected circular reference: [a -> a]");
        assert!(err.is_graph_error());
        assert_eq!(err.to_string(), "detected circular reference: [a -> a]");

        let err = ChainError::MissingField("serviceName");
        assert!(!err.is_graph_error());
        assert!(err.as_graph_error().is_none());
        assert_eq!(err.to_string(), "serviceName is required");
    }
}
