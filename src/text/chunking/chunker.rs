//! Sentence-window chunker with boundary-snapped overlap

use super::{
    config::ChunkingConfig,
    error::{ChunkingError, Result},
    types::{Chunk, ChunkId, ClusterId},
};
use crate::text::SentenceSplitter;
use std::ops::Range;
use tracing::debug;

/// Splits text into overlapping windows along sentence boundaries
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    sentence_splitter: SentenceSplitter,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate().map_err(ChunkingError::configuration)?;
        let sentence_splitter = SentenceSplitter::new(config.segmentation, None, None, None, None);
        Ok(Self {
            config,
            sentence_splitter,
        })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk one source text.
    ///
    /// Empty text yields no chunks. Every chunk is checked against the span
    /// invariants before it is returned.
    pub fn chunk(
        &self,
        text: &str,
        source_text_id: usize,
        cluster_id: ClusterId,
        speaker: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        debug!(
            "Chunking source {} (cluster {}) of {} bytes",
            source_text_id,
            cluster_id,
            text.len()
        );
        let mut chunks: Vec<Chunk> = Vec::new();
        for (seq, range) in self.windows(text).into_iter().enumerate() {
            let chunk = Chunk::new(
                ChunkId::new(source_text_id, seq),
                cluster_id,
                speaker.map(str::to_string),
                text,
                range,
            )?;
            if let Some(prev) = chunks.last() {
                if chunk.start_offset <= prev.start_offset || chunk.end_offset <= prev.end_offset {
                    return Err(ChunkingError::validation(format!(
                        "chunk {} ({}..{}) does not advance past chunk {} ({}..{})",
                        chunk.id,
                        chunk.start_offset,
                        chunk.end_offset,
                        prev.id,
                        prev.start_offset,
                        prev.end_offset
                    )));
                }
                if chunk.start_offset > prev.end_offset {
                    return Err(ChunkingError::validation(format!(
                        "gap between chunk {} and chunk {}",
                        prev.id, chunk.id
                    )));
                }
            }
            chunks.push(chunk);
        }
        debug!("Created {} chunks from source {}", chunks.len(), source_text_id);
        Ok(chunks)
    }

    /// Byte ranges of the windows over `text`.
    pub fn windows(&self, text: &str) -> Vec<Range<usize>> {
        let sentences = self.sentence_splitter.spans(text);
        if sentences.is_empty() {
            return vec![];
        }
        let n = sentences.len();
        let size = self.config.chunk_size;

        // prefix[k]: characters before sentence k
        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0usize);
        for s in &sentences {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + text[s.clone()].chars().count());
        }
        // characters in sentences i..=j
        let length = |i: usize, j: usize| prefix[j + 1] - prefix[i];

        let mut windows = Vec::new();
        let mut i = 0;
        loop {
            let mut j = i;
            while j + 1 < n
                && (j - i + 1 < self.config.min_sentences_per_chunk || length(i, j + 1) <= size)
            {
                j += 1;
            }
            windows.push(sentences[i].start..sentences[j].end);
            if j + 1 >= n {
                break;
            }

            // snap `overlap` characters before the window end back to a sentence start
            let target = prefix[j + 1].saturating_sub(self.config.chunk_overlap);
            let mut k = (i + 1..=j + 1)
                .rev()
                .find(|&k| prefix[k] <= target)
                .unwrap_or(j + 1);
            // the next window must still reach the first uncovered sentence
            while k <= j && length(k, j + 1) > size {
                k += 1;
            }
            i = k;
        }
        windows
    }
}

/// Rebuild the source from chunks of a single source, skipping overlap regions.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered = 0;
    for chunk in chunks {
        let skip = covered.max(chunk.start_offset) - chunk.start_offset;
        if skip < chunk.text.len() {
            text.push_str(&chunk.text[skip..]);
        }
        covered = covered.max(chunk.end_offset);
    }
    text
}
