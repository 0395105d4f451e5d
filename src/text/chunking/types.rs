//! Core data structures for transcript chunking

use super::error::{ChunkingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Grouping key that scopes theme consolidation (one per transcript)
pub type ClusterId = u32;

/// Chunk identifier, ordered by source text first and emission sequence second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    /// Index of the source text this chunk was cut from
    pub source: usize,
    /// Emission sequence within the source
    pub seq: usize,
}

impl ChunkId {
    pub fn new(source: usize, seq: usize) -> Self {
        Self { source, seq }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.seq)
    }
}

/// Bounded, offset-tracked substring of a source transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Shared by all (possibly overlapping) chunks of the same source
    pub source_text_id: usize,
    pub cluster_id: ClusterId,
    pub speaker: Option<String>,
    /// Byte offset into the preprocessed source text
    pub start_offset: usize,
    /// Exclusive byte offset into the preprocessed source text
    pub end_offset: usize,
    pub text: String,
}

impl Chunk {
    /// Cut a chunk out of `source`. Empty or out-of-range spans are rejected.
    pub fn new(
        id: ChunkId,
        cluster_id: ClusterId,
        speaker: Option<String>,
        source: &str,
        range: Range<usize>,
    ) -> Result<Self> {
        if range.end <= range.start {
            return Err(ChunkingError::validation(format!(
                "chunk {} has empty span {}..{}",
                id, range.start, range.end
            )));
        }
        let text = source.get(range.clone()).ok_or_else(|| {
            ChunkingError::validation(format!(
                "chunk {} span {}..{} is outside the source ({} bytes) or not on a char boundary",
                id,
                range.start,
                range.end,
                source.len()
            ))
        })?;
        Ok(Self {
            id,
            source_text_id: id.source,
            cluster_id,
            speaker,
            start_offset: range.start,
            end_offset: range.end,
            text: text.to_string(),
        })
    }

    /// Length of the chunk in characters
    pub fn char_length(&self) -> usize {
        self.text.chars().count()
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }

    /// Speaker label, or "unknown" when none was attributed
    pub fn speaker_or_unknown(&self) -> &str {
        self.speaker.as_deref().unwrap_or(crate::coding::UNKNOWN_SPEAKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let source = "Hello there. General Kenobi.";
        let chunk = Chunk::new(ChunkId::new(0, 0), 1, None, source, 0..13).unwrap();
        assert_eq!(chunk.text, "Hello there. ");
        assert_eq!(chunk.char_length(), 13);
        assert_eq!(chunk.byte_range(), 0..13);
        assert_eq!(chunk.source_text_id, 0);
        assert_eq!(chunk.speaker_or_unknown(), "unknown");
    }

    #[test]
    fn test_chunk_rejects_empty_span() {
        let err = Chunk::new(ChunkId::new(0, 0), 1, None, "abc", 2..2).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_chunk_rejects_split_char() {
        // 'é' is two bytes
        let err = Chunk::new(ChunkId::new(0, 0), 1, None, "é", 0..1).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(Chunk::new(ChunkId::new(0, 0), 1, None, "abc", 1..9).is_err());
    }

    #[test]
    fn test_chunk_id_order() {
        let mut ids = vec![ChunkId::new(1, 0), ChunkId::new(0, 2), ChunkId::new(0, 1)];
        ids.sort();
        assert_eq!(
            ids,
            vec![ChunkId::new(0, 1), ChunkId::new(0, 2), ChunkId::new(1, 0)]
        );
        assert_eq!(ChunkId::new(2, 5).to_string(), "2-5");
    }
}
