//! Sentence-window text chunking for transcript coding
//!
//! Text is split into overlapping windows along sentence boundaries. Each window
//! is an offset-tracked [`Chunk`] of its source, and the non-overlapping parts of
//! consecutive chunks reassemble the source exactly.

pub mod chunker;
pub mod config;
pub mod error;
pub mod types;

// Re-export main public interfaces
pub use chunker::{Chunker, reassemble};
pub use config::{ChunkingConfig, ChunkingStatistics};
pub use error::{ChunkingError, Result};
pub use types::{Chunk, ChunkId, ClusterId};
