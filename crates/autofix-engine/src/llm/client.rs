use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// One transport retry on connect errors, 429 and 5xx.
pub(crate) const MAX_RETRIES: u32 = 1;
pub(crate) const RETRY_BACKOFF_MS: u64 = 500;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434/v1";
pub const DEFAULT_MODEL: &str = "qwen2.5-coder:7b-instruct";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Why a model call produced no usable text.
///
/// Only `MalformedTransport` ends a session; everything else is a failed
/// attempt for the current iteration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("model returned an empty completion")]
    Empty,
    #[error("model refused the request: {0}")]
    Refused(String),
    #[error("malformed model response: {0}")]
    MalformedTransport(String),
}

impl ModelError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::MalformedTransport(_))
    }
}

pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;

/// A chat-style text generator. One call is one external request.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> ModelFuture<'a>;

    /// Label recorded as the rationale of generated candidates.
    fn model_name(&self) -> &str;
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WIRE TYPES (OpenAI-compatible chat completions)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null in some API responses (e.g., when refusal or error occurs)
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHAT CLIENT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Base URL up to and including the API version, e.g. `http://host/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// `ModelClient` over an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    settings: ChatSettings,
}

/// Create a configured HTTP client for model requests
pub(crate) fn create_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(timeout)
    } else if err.is_connect() {
        ModelError::Unavailable(format!("could not connect: {err}"))
    } else {
        ModelError::Unavailable(err.to_string())
    }
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}

impl ChatClient {
    pub fn new(settings: ChatSettings) -> anyhow::Result<Self> {
        let http = create_http_client(settings.timeout)?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Send with one retry on transient failures. Returns the raw 2xx body.
    async fn send_with_retry(&self, body: &ChatRequest<'_>) -> Result<String, ModelError> {
        let mut retry_count = 0;
        loop {
            let mut request = self
                .http
                .post(self.endpoint())
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = &self.settings.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                        continue;
                    }
                    return Err(map_transport_error(err, self.settings.timeout));
                }
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|err| map_transport_error(err, self.settings.timeout))?;

            if status.is_success() {
                return Ok(text);
            }

            let transient = status.as_u16() == 429 || status.is_server_error();
            if transient && retry_count < MAX_RETRIES {
                retry_count += 1;
                tracing::debug!(%status, "model endpoint returned a transient error, retrying");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                continue;
            }

            let message = match status.as_u16() {
                401 | 403 => "authentication rejected; check AUTOFIX_API_KEY".to_string(),
                429 => format!("rate limited after {} retries", retry_count),
                500..=599 => format!("server error ({status})"),
                _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
            };
            return Err(ModelError::Unavailable(message));
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream: false,
        };

        let text = self.send_with_retry(&request).await?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ModelError::MalformedTransport(format!("{}: {}", e, sanitize_api_response(&text)))
        })?;

        let choice = parsed.choices.into_iter().next();
        if let Some(refusal) = choice.as_ref().and_then(|c| c.message.refusal.as_deref()) {
            return Err(ModelError::Refused(truncate_str(refusal, 200).to_string()));
        }
        let content = choice
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(content)
    }
}

impl ModelClient for ChatClient {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> ModelFuture<'a> {
        Box::pin(async move {
            match timeout(self.settings.timeout, self.chat(system, user)).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(self.settings.timeout)),
            }
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}
