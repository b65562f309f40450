//! Soulcraft LLM - classifier/generator boundary with retry and provider adapters

pub mod anthropic;
pub mod mock;
pub mod provider;
pub mod retry;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use mock::{MockBehavior, MockProvider};
pub use provider::{LlmError, LlmProvider, LlmResult};
pub use retry::{with_retry, RetryPolicy, RetryingProvider};
pub use types::*;
