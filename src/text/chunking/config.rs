//! Configuration and statistics for transcript chunking

use super::types::Chunk;
use crate::text::Segmentation;
use serde::{Deserialize, Serialize};

/// Configuration for sentence-window chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target maximum characters per chunk
    pub chunk_size: usize,
    /// Characters of the previous window to repeat at the start of the next one
    pub chunk_overlap: usize,
    /// A window closes only once it holds this many sentences
    pub min_sentences_per_chunk: usize,
    /// Sentence boundary detection strategy
    pub segmentation: Segmentation,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 128,
            min_sentences_per_chunk: 1,
            segmentation: Segmentation::Unicode,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }

        if self.min_sentences_per_chunk == 0 {
            return Err("min_sentences_per_chunk must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Statistical information over a batch of chunks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkingStatistics {
    pub total_chunks: usize,
    /// Sum of chunk lengths in characters (overlap counted once per chunk)
    pub total_characters: usize,
    pub average_chunk_length: f64,
    pub min_chunk_length: usize,
    pub max_chunk_length: usize,
    /// Single sentences longer than the configured chunk size
    pub oversized_chunks: usize,
    /// Characters shared between consecutive chunks of the same source
    pub overlap_characters: usize,
}

impl ChunkingStatistics {
    /// Compute statistics for chunks in emission order
    pub fn from_chunks(chunks: &[Chunk], chunk_size: usize) -> Self {
        let mut stats = Self::default();
        let mut prev: Option<&Chunk> = None;
        for chunk in chunks {
            let length = chunk.char_length();
            stats.record_chunk(length, chunk_size);
            if let Some(p) = prev.filter(|p| {
                p.source_text_id == chunk.source_text_id && chunk.start_offset < p.end_offset
            }) {
                let shared = &p.text[chunk.start_offset - p.start_offset..];
                stats.overlap_characters += shared.chars().count();
            }
            prev = Some(chunk);
        }
        stats.calculate_derived_metrics();
        stats
    }

    fn record_chunk(&mut self, length: usize, chunk_size: usize) {
        self.total_chunks += 1;
        self.total_characters += length;
        if self.total_chunks == 1 || length > self.max_chunk_length {
            self.max_chunk_length = length;
        }
        if self.total_chunks == 1 || length < self.min_chunk_length {
            self.min_chunk_length = length;
        }
        if length > chunk_size {
            self.oversized_chunks += 1;
        }
    }

    /// Calculate derived metrics (call this after all chunks are recorded)
    pub fn calculate_derived_metrics(&mut self) {
        if self.total_chunks > 0 {
            self.average_chunk_length = self.total_characters as f64 / self.total_chunks as f64;
        }
    }

    /// Get summary as string for logging
    pub fn summary(&self) -> String {
        format!(
            "Chunking Stats: {} chunks, {} chars ({:.1} avg, min {}, max {}) | \
            oversized: {}, overlap chars: {}",
            self.total_chunks,
            self.total_characters,
            self.average_chunk_length,
            self.min_chunk_length,
            self.max_chunk_length,
            self.oversized_chunks,
            self.overlap_characters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::chunking::ChunkId;

    #[test]
    fn test_config_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());
        assert!(ChunkingConfig::new(0, 0).validate().is_err());
        assert!(ChunkingConfig::new(100, 100).validate().is_err());
        assert!(ChunkingConfig::new(100, 150).validate().is_err());
        assert!(ChunkingConfig::new(1, 0).validate().is_ok());

        let config = ChunkingConfig {
            min_sentences_per_chunk: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_statistics_from_chunks() {
        let source = "aaaa bbbb cccc";
        let chunks = vec![
            Chunk::new(ChunkId::new(0, 0), 1, None, source, 0..10).unwrap(),
            Chunk::new(ChunkId::new(0, 1), 1, None, source, 5..14).unwrap(),
        ];
        let stats = ChunkingStatistics::from_chunks(&chunks, 9);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_characters, 19);
        assert_eq!(stats.min_chunk_length, 9);
        assert_eq!(stats.max_chunk_length, 10);
        assert_eq!(stats.oversized_chunks, 1);
        // "bbbb " is shared
        assert_eq!(stats.overlap_characters, 5);
        assert!((stats.average_chunk_length - 9.5).abs() < f64::EPSILON);
        assert!(stats.summary().contains("2 chunks"));
    }

    #[test]
    fn test_statistics_ignores_overlap_across_sources() {
        let chunks = vec![
            Chunk::new(ChunkId::new(0, 0), 1, None, "abcdef", 0..6).unwrap(),
            Chunk::new(ChunkId::new(1, 0), 2, None, "abcdef", 0..6).unwrap(),
        ];
        let stats = ChunkingStatistics::from_chunks(&chunks, 10);
        assert_eq!(stats.overlap_characters, 0);
        assert_eq!(stats.oversized_chunks, 0);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = ChunkingStatistics::from_chunks(&[], 10);
        assert_eq!(stats, ChunkingStatistics::default());
    }
}
