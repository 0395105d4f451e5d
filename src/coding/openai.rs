use super::prompt::{SYSTEM_PROMPT, user_prompt};
use super::{CodeGenerator, CodingContext, CodingError, RawCode, decode_codes};
use crate::text::chunking::Chunk;
use futures::FutureExt;
use futures::future::BoxFuture;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus up to 25% random jitter
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let jitter: f64 = rand::rng().random_range(0.0..=0.25);
        delay + delay.mul_f64(jitter)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: usize,
    pub retry: RetryPolicy,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            temperature: 0.3,
            max_tokens: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn request_error(e: reqwest::Error) -> CodingError {
    let transient = e.is_timeout() || e.is_connect();
    CodingError::service(e.status().map(|s| s.as_u16()), e.to_string(), transient)
}

/// Chat completions client that codes one chunk per request
pub struct OpenAiCodeGenerator {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiCodeGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, CodingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                CodingError::service(None, format!("failed to build HTTP client: {}", e), false)
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn send_once(&self, prompt: &str) -> Result<String, CodingError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CodingError::service(
                Some(status.as_u16()),
                format!("OpenAI returned {}: {}", status, text),
                is_transient_status(status),
            ));
        }
        let text = resp.text().await.map_err(request_error)?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| CodingError::parse(format!("invalid completion body: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| CodingError::parse("completion has no content"))
    }

    /// One completion with retries on transient failures
    pub async fn complete(&self, prompt: &str) -> Result<String, CodingError> {
        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.jittered_backoff(attempt);
                    warn!(
                        "transient error (attempt {}/{}): {}, retrying in {:?}",
                        attempt + 1,
                        retry.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl CodeGenerator for OpenAiCodeGenerator {
    fn generate<'a>(
        &'a self,
        chunk: &'a Chunk,
        context: &'a CodingContext,
    ) -> BoxFuture<'a, Result<Vec<RawCode>, CodingError>> {
        async move {
            let prompt = user_prompt(chunk, context);
            let content = self.complete(&prompt).await?;
            let codes = decode_codes(chunk, &content)?;
            debug!("chunk {}: {} codes", chunk.id, codes.len());
            Ok(codes)
        }
        .boxed()
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
