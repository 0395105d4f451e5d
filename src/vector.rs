//! Optional chunk embeddings and nearest-neighbor lookup
//!
//! The pipeline only depends on the [`Embedder`] capability. Without a
//! Hugging Face token the [`NoopEmbedder`] is used and nothing is indexed.

use crate::text::chunking::ChunkId;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/modernbert-embed-base";
pub const DEFAULT_HUGGING_FACE_BASE_URL: &str = "https://api-inference.huggingface.co";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("embedding service error (status {status:?}): {message}")]
    Service { status: Option<u16>, message: String },

    #[error("unexpected embedding response: {0}")]
    Parse(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl VectorError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Service { .. } => "service",
            Self::Parse(_) => "parse",
            Self::DimensionMismatch { .. } => "validation",
        }
    }
}

pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, VectorError>>;

    fn is_enabled(&self) -> bool;
}

/// Disabled embedder; `embed` returns an empty vector
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbedder;

impl Embedder for NoopEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, VectorError>> {
        futures::future::ready(Ok(vec![])).boxed()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub token: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl HuggingFaceConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_HUGGING_FACE_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
}

// the pipeline returns either a pooled vector or one vector per token
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
    Batched(Vec<Vec<Vec<f32>>>),
}

fn mean_pool(tokens: &[Vec<f32>]) -> Result<Vec<f32>, VectorError> {
    let dimension = tokens
        .first()
        .map(Vec::len)
        .ok_or_else(|| VectorError::Parse("no token embeddings".to_string()))?;
    let mut sum = vec![0f32; dimension];
    for token in tokens {
        if token.len() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: token.len(),
            });
        }
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    Ok(sum.into_iter().map(|v| v / n).collect())
}

/// Hugging Face inference API feature-extraction client
pub struct HuggingFaceEmbedder {
    config: HuggingFaceConfig,
    client: Client,
}

impl HuggingFaceEmbedder {
    pub fn new(config: HuggingFaceConfig) -> Result<Self, VectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VectorError::Service {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.token.trim())
            .json(&FeatureExtractionRequest { inputs: text })
            .send()
            .await
            .map_err(|e| VectorError::Service {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| VectorError::Service {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(VectorError::Service {
                status: Some(status.as_u16()),
                message: body,
            });
        }
        let parsed: FeatureExtractionResponse =
            serde_json::from_str(&body).map_err(|e| VectorError::Parse(e.to_string()))?;
        let vector = match parsed {
            FeatureExtractionResponse::Pooled(v) => v,
            FeatureExtractionResponse::Tokens(tokens) => mean_pool(&tokens)?,
            FeatureExtractionResponse::Batched(batch) => {
                let tokens = batch
                    .into_iter()
                    .next()
                    .ok_or_else(|| VectorError::Parse("empty batch".to_string()))?;
                mean_pool(&tokens)?
            }
        };
        debug!("embedded {} chars into {} dimensions", text.len(), vector.len());
        Ok(vector)
    }
}

impl Embedder for HuggingFaceEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, VectorError>> {
        self.request(text).boxed()
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Cosine similarity; 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    dimension: Option<usize>,
    entries: Vec<(ChunkId, Vec<f32>)>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first vector added fixes the dimension
    pub fn add(&mut self, chunk_id: ChunkId, vector: Vec<f32>) -> Result<(), VectorError> {
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            None if vector.is_empty() => {
                return Err(VectorError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }
        self.entries.push((chunk_id, vector));
        Ok(())
    }

    /// Nearest chunks by cosine similarity, best first; ties by chunk id
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(ChunkId, f32)>, VectorError> {
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        let mut scored: Vec<(ChunkId, f32)> = self
            .entries
            .iter()
            .map(|(id, v)| (*id, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
