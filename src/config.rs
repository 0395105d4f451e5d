//! Application configuration from the environment (and `.env`)

use crate::coding::{CodeGenerator, OpenAiCodeGenerator, OpenAiConfig, RetryPolicy};
use crate::coding::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::{AnalysisError, Result};
use crate::pipeline::AnalyzerConfig;
use crate::postprocess::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_FINDINGS_LIMIT, PostprocessConfig};
use crate::text::Segmentation;
use crate::text::chunking::ChunkingConfig;
use crate::text::preprocess::{Language, PreprocessConfig};
use crate::util::string::ToOption;
use crate::vector::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_HUGGING_FACE_BASE_URL, Embedder, HuggingFaceConfig,
    HuggingFaceEmbedder, NoopEmbedder,
};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_sentences_per_chunk: usize,
    pub sentence_segmentation: Segmentation,
    pub hugging_face_token: Option<String>,
    pub embedding_model: String,
    pub hugging_face_base_url: String,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub theme_similarity_threshold: f64,
    pub top_findings_limit: usize,
    pub enable_cache: bool,
    pub strip_fillers: bool,
    pub language: Language,
}

impl Default for AppConfig {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            openai_api_key: String::new(),
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            min_sentences_per_chunk: chunking.min_sentences_per_chunk,
            sentence_segmentation: chunking.segmentation,
            hugging_face_token: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            hugging_face_base_url: DEFAULT_HUGGING_FACE_BASE_URL.to_string(),
            max_concurrency: 4,
            max_retries: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 60,
            theme_similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_findings_limit: DEFAULT_TOP_FINDINGS_LIMIT,
            enable_cache: true,
            strip_fillers: false,
            language: Language::default(),
        }
    }
}

// keys stay out of logs
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("min_sentences_per_chunk", &self.min_sentences_per_chunk)
            .field("sentence_segmentation", &self.sentence_segmentation)
            .field("embeddings", &self.hugging_face_token.is_some())
            .field("embedding_model", &self.embedding_model)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_retries", &self.max_retries)
            .field("theme_similarity_threshold", &self.theme_similarity_threshold)
            .field("enable_cache", &self.enable_cache)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Read `.env` when present, then the process environment.
    pub fn from_env() -> Result<Self> {
        // a missing .env file is fine
        let _ = dotenv::dotenv();
        let config: Self = envy::from_env().map_err(|e| AnalysisError::config(e.to_string()))?;
        config.normalized().validate()
    }

    pub fn from_iter<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(pairs).map_err(|e| AnalysisError::config(e.to_string()))?;
        config.normalized().validate()
    }

    fn normalized(mut self) -> Self {
        self.openai_api_key = self.openai_api_key.trim().to_string();
        self.hugging_face_token = self.hugging_face_token.to_option();
        self
    }

    pub fn validate(self) -> Result<Self> {
        if self.openai_api_key.is_empty() {
            return Err(AnalysisError::config("OPENAI_API_KEY is not set"));
        }
        self.chunking_config()
            .validate()
            .map_err(AnalysisError::config)?;
        if self.max_concurrency == 0 {
            return Err(AnalysisError::config("MAX_CONCURRENCY must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(AnalysisError::config("REQUEST_TIMEOUT_SECS must be at least 1"));
        }
        if !(self.theme_similarity_threshold > 0.0 && self.theme_similarity_threshold <= 1.0) {
            return Err(AnalysisError::config(format!(
                "THEME_SIMILARITY_THRESHOLD must be in (0, 1], got {}",
                self.theme_similarity_threshold
            )));
        }
        if self.top_findings_limit == 0 {
            return Err(AnalysisError::config("TOP_FINDINGS_LIMIT must be at least 1"));
        }
        Ok(self)
    }

    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            min_sentences_per_chunk: self.min_sentences_per_chunk,
            segmentation: self.sentence_segmentation,
        }
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            language: self.language,
            strip_fillers: self.strip_fillers,
        }
    }

    pub fn postprocess_config(&self) -> PostprocessConfig {
        PostprocessConfig {
            similarity_threshold: self.theme_similarity_threshold,
            top_findings_limit: self.top_findings_limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: MAX_RETRY_DELAY,
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            model: self.openai_model.clone(),
            base_url: self.openai_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry_policy(),
            ..OpenAiConfig::new(self.openai_api_key.clone())
        }
    }

    /// None when no Hugging Face token is configured
    pub fn hugging_face_config(&self) -> Option<HuggingFaceConfig> {
        self.hugging_face_token.as_ref().map(|token| HuggingFaceConfig {
            model: self.embedding_model.clone(),
            base_url: self.hugging_face_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..HuggingFaceConfig::new(token.clone())
        })
    }

    pub fn code_generator(&self) -> Result<Arc<dyn CodeGenerator>> {
        Ok(Arc::new(OpenAiCodeGenerator::new(self.openai_config())?))
    }

    /// Hugging Face embeddings when a token is set, a disabled embedder otherwise
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        match self.hugging_face_config() {
            Some(config) => Ok(Arc::new(HuggingFaceEmbedder::new(config)?)),
            None => Ok(Arc::new(NoopEmbedder)),
        }
    }

    pub fn analyzer_config(&self, inputs_dir: impl Into<PathBuf>) -> AnalyzerConfig {
        AnalyzerConfig {
            inputs_dir: inputs_dir.into(),
            chunking: self.chunking_config(),
            preprocess: self.preprocess_config(),
            postprocess: self.postprocess_config(),
            max_concurrency: self.max_concurrency,
            enable_cache: self.enable_cache,
        }
    }
}
