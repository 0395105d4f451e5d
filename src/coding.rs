//! Thematic coding of chunks by an external language model
//!
//! [`CodeGenerator`] is the service boundary: one call per chunk, returning
//! the raw codes the model suggested. [`decode`] turns loosely typed model
//! output into [`RawCode`]s and [`openai`] is the production client.

pub mod decode;
pub mod openai;
pub mod prompt;

use crate::project::ProjectContext;
use crate::text::chunking::{Chunk, ChunkId};
use crate::transcript::ParticipantType;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

pub use decode::decode_codes;
pub use openai::{OpenAiCodeGenerator, OpenAiConfig, RetryPolicy};

/// Speaker recorded when neither the model nor the transcript names one
pub const UNKNOWN_SPEAKER: &str = "unknown";

/// Code priority, ordered low < medium < high
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Case-insensitive parse of "low" / "medium" / "high"
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Weight used by visualization exports
    pub fn score(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One code suggested by the model for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCode {
    pub chunk_id: ChunkId,
    /// Position within the chunk's response
    pub ordinal: usize,
    pub theme_name: String,
    pub theme_description: Option<String>,
    pub sub_theme_name: Option<String>,
    pub sub_theme_description: Option<String>,
    pub priority: Priority,
    /// Verbatim excerpt copied from the model response
    pub quote: Option<String>,
    pub speaker: Option<String>,
}

impl RawCode {
    pub fn new(chunk_id: ChunkId, ordinal: usize, theme_name: impl Into<String>) -> Self {
        Self {
            chunk_id,
            ordinal,
            theme_name: theme_name.into(),
            theme_description: None,
            sub_theme_name: None,
            sub_theme_description: None,
            priority: Priority::default(),
            quote: None,
            speaker: None,
        }
    }

    pub fn with_sub_theme(mut self, name: impl Into<String>) -> Self {
        self.sub_theme_name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_quote(mut self, quote: impl Into<String>, speaker: Option<&str>) -> Self {
        self.quote = Some(quote.into());
        self.speaker = speaker.map(str::to_string);
        self
    }
}

/// Per-chunk failure of the coding service
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodingError {
    #[error("service error (status {status:?}, transient: {transient}): {message}")]
    Service {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    #[error("unparseable model output: {0}")]
    Parse(String),
}

impl CodingError {
    pub fn service<S: Into<String>>(status: Option<u16>, message: S, transient: bool) -> Self {
        Self::Service {
            status,
            message: message.into(),
            transient,
        }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Worth retrying (rate limit, timeout, server error)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service { transient: true, .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service",
            Self::Parse(_) => "parse",
        }
    }
}

/// What the model needs to know besides the chunk itself
#[derive(Debug, Clone, Default)]
pub struct CodingContext {
    pub participant_type: ParticipantType,
    pub project: Arc<ProjectContext>,
}

impl CodingContext {
    pub fn new(participant_type: ParticipantType, project: Arc<ProjectContext>) -> Self {
        Self {
            participant_type,
            project,
        }
    }

    /// Cache key: identical text from the same speaker coded under the same
    /// participant segment
    pub fn content_hash(&self, chunk: &Chunk) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.participant_type.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.speaker_or_unknown().as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// External code generation service
pub trait CodeGenerator: Send + Sync {
    /// Raw codes for one chunk. Retries happen inside; the error is final.
    fn generate<'a>(
        &'a self,
        chunk: &'a Chunk,
        context: &'a CodingContext,
    ) -> BoxFuture<'a, Result<Vec<RawCode>, CodingError>>;

    /// Model identifier recorded in results
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(ChunkId::new(0, 0), 1, None, text, 0..text.len()).unwrap()
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::Low.max(Priority::High), Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse(" medium "), Some(Priority::Medium));
        assert_eq!(Priority::parse("low"), Some(Priority::Low));
        assert_eq!(Priority::parse("critical"), None);
        assert_eq!(
            serde_json::to_string(&Priority::High).unwrap(),
            "\"high\""
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(CodingError::service(Some(429), "slow down", true).is_transient());
        assert!(!CodingError::service(Some(401), "bad key", false).is_transient());
        assert!(!CodingError::parse("nope").is_transient());
        assert_eq!(CodingError::parse("nope").category(), "parse");
    }

    #[test]
    fn test_content_hash() {
        let project = Arc::new(ProjectContext::default());
        let buyer = CodingContext::new(ParticipantType::Buyer, project.clone());
        let potential = CodingContext::new(ParticipantType::Potential, project);
        let a = chunk("It is too expensive.");
        let b = chunk("It is too expensive.");
        let c = chunk("It is cheap.");
        assert_eq!(buyer.content_hash(&a), buyer.content_hash(&b));
        assert_ne!(buyer.content_hash(&a), buyer.content_hash(&c));
        assert_ne!(buyer.content_hash(&a), potential.content_hash(&a));
        assert_eq!(buyer.content_hash(&a).len(), 64);
    }

    #[test]
    fn test_content_hash_speaker() {
        let project = Arc::new(ProjectContext::default());
        let buyer = CodingContext::new(ParticipantType::Buyer, project);
        let mut moderator = chunk("It is too expensive.");
        moderator.speaker = Some("Moderator".to_string());
        let mut participant = chunk("It is too expensive.");
        participant.speaker = Some("P1".to_string());
        let unattributed = chunk("It is too expensive.");

        assert_ne!(buyer.content_hash(&moderator), buyer.content_hash(&participant));
        assert_ne!(buyer.content_hash(&participant), buyer.content_hash(&unattributed));
        participant.speaker = Some("Moderator".to_string());
        assert_eq!(buyer.content_hash(&moderator), buyer.content_hash(&participant));
    }
}
