//! Error types for transcript chunking

/// Error types for chunking operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Result type for chunking operations
pub type Result<T> = std::result::Result<T, ChunkingError>;

impl ChunkingError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Configuration problems need a different setup; a bad chunk only affects its source
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::Validation(_) => true,
        }
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
        }
    }
}
