//! Error taxonomy of an analysis run
//!
//! Configuration and input errors are fatal and map to distinct exit codes.
//! Per-chunk service and parse failures never reach this type during a run;
//! the orchestrator turns them into warnings.

use crate::coding::CodingError;
use crate::text::chunking::ChunkingError;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("service error (status {status:?}): {message}")]
    Service {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("project directory not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("no transcripts found in {0}")]
    NoTranscripts(PathBuf),

    #[error("none of {attempted} chunks could be coded")]
    NoSuccessfulChunks { attempted: usize },

    #[error("analysis cancelled")]
    Cancelled,

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Service { .. } => "service",
            Self::Parse(_) => "parse",
            Self::Io { .. } => "io",
            Self::Validation(_) => "validation",
            Self::ProjectNotFound(_) | Self::NoTranscripts(_) => "input",
            Self::NoSuccessfulChunks { .. } => "analysis",
            Self::Cancelled => "cancelled",
            Self::Chunking(e) => e.category(),
            Self::Json(_) => "serialization",
        }
    }

    /// Whether a batch can continue past this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Service { .. } | Self::Parse(_) | Self::Io { .. } => true,
            Self::Chunking(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// Process exit code of the `analyze` binary
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::ProjectNotFound(_) | Self::NoTranscripts(_) | Self::Io { .. } => 3,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

impl From<CodingError> for AnalysisError {
    fn from(e: CodingError) -> Self {
        match e {
            CodingError::Service {
                status,
                message,
                transient,
            } => Self::Service {
                message,
                status,
                transient,
            },
            CodingError::Parse(message) => Self::Parse(message),
        }
    }
}

impl From<VectorError> for AnalysisError {
    fn from(e: VectorError) -> Self {
        match e {
            VectorError::Service { status, message } => Self::Service {
                message,
                status,
                transient: false,
            },
            VectorError::Parse(message) => Self::Parse(message),
            e @ VectorError::DimensionMismatch { .. } => Self::Validation(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
