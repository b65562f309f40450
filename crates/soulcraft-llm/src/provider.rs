//! LLM Provider trait: the classifier/generator boundary injected into synthesis

use crate::types::Classification;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Network, timeout, 429 and 5xx failures are worth retrying. Everything else is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. }
            | LlmError::ServerError { .. }
            | LlmError::Timeout(_)
            | LlmError::StreamError(_)
            | LlmError::NetworkError(_) => true,
            LlmError::RequestFailed(_)
            | LlmError::AuthFailed(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Unavailable(_)
            | LlmError::Cancelled => false,
        }
    }

    /// Map an HTTP failure status to the matching error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LlmError::AuthFailed(body),
            429 => LlmError::RateLimited { retry_after_ms: 60_000 },
            500..=599 => LlmError::ServerError { status, message: body },
            _ => LlmError::RequestFailed(format!("{}: {}", status, body)),
        }
    }
}

impl From<LlmError> for soulcraft_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Unavailable(msg) => soulcraft_core::Error::MatcherUnavailable(msg),
            other => soulcraft_core::Error::llm_error("llm", other.to_string()),
        }
    }
}

/// LLM Provider trait
///
/// Implementations are stateless from the caller's point of view. Synthesis never
/// constructs one itself and never substitutes a weaker comparison when one fails.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Pick one of `categories` for `prompt`, with a quantized confidence.
    async fn classify(&self, prompt: &str, categories: &[&str]) -> LlmResult<Classification>;

    /// Free-form completion.
    async fn generate(&self, prompt: &str) -> LlmResult<String>;
}
