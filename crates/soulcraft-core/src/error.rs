//! Error types for soulcraft

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("matcher unavailable: {0}")]
    MatcherUnavailable(String),

    #[error(
        "synthesis lock held by pid {pid} at {}; wait for it to finish or remove the lock if that process is gone",
        .path.display()
    )]
    LockContention { path: PathBuf, pid: u32 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    pub fn lock_contention(path: impl Into<PathBuf>, pid: u32) -> Self {
        Self::LockContention {
            path: path.into(),
            pid,
        }
    }
}
