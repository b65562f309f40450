//! MockProvider: deterministic LLM responses for testing
//!
//! Implements `LlmProvider` with canned behaviors, either consumed in order
//! from a sequence or computed from the prompt by a responder function.

use crate::provider::{LlmError, LlmProvider, LlmResult};
use crate::types::{parse_classification, Classification, ConfidenceLevel};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Return text (for `classify`, the text is parsed like a real answer)
    Text(String),
    /// Return a classification directly
    Classify { category: String, confidence: ConfidenceLevel },
    /// Fail with a retryable server error
    Transient(String),
    /// Fail with a non-retryable error
    Fatal(String),
}

impl MockBehavior {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn classify(category: impl Into<String>, confidence: ConfidenceLevel) -> Self {
        Self::Classify {
            category: category.into(),
            confidence,
        }
    }
}

type Responder = Arc<dyn Fn(&str) -> MockBehavior + Send + Sync>;

pub struct MockProvider {
    behaviors: Mutex<Vec<MockBehavior>>,
    default_behavior: MockBehavior,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(Vec::new()),
            default_behavior: behavior,
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors),
            default_behavior: MockBehavior::Text("(mock: sequence exhausted)".into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock whose answer is computed from the prompt. Safe under
    /// concurrent calls where ordering is not deterministic.
    pub fn from_fn(f: impl Fn(&str) -> MockBehavior + Send + Sync + 'static) -> Self {
        Self {
            behaviors: Mutex::new(Vec::new()),
            default_behavior: MockBehavior::Text(String::new()),
            responder: Some(Arc::new(f)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Get the number of calls made
    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }

    /// Every prompt received, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    async fn next_behavior(&self, prompt: &str) -> MockBehavior {
        self.prompts.lock().await.push(prompt.to_string());

        if let Some(responder) = &self.responder {
            return responder(prompt);
        }

        let mut behaviors = self.behaviors.lock().await;
        if behaviors.is_empty() {
            self.default_behavior.clone()
        } else {
            behaviors.remove(0)
        }
    }
}

fn fail(behavior: &MockBehavior) -> Option<LlmError> {
    match behavior {
        MockBehavior::Transient(msg) => Some(LlmError::ServerError {
            status: 503,
            message: msg.clone(),
        }),
        MockBehavior::Fatal(msg) => Some(LlmError::AuthFailed(msg.clone())),
        _ => None,
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, prompt: &str, categories: &[&str]) -> LlmResult<Classification> {
        let behavior = self.next_behavior(prompt).await;
        if let Some(e) = fail(&behavior) {
            return Err(e);
        }
        Ok(match behavior {
            MockBehavior::Classify { category, confidence } => Classification::new(category, confidence),
            MockBehavior::Text(text) => parse_classification(&text, categories),
            _ => Classification::unrecognized(),
        })
    }

    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        let behavior = self.next_behavior(prompt).await;
        if let Some(e) = fail(&behavior) {
            return Err(e);
        }
        Ok(match behavior {
            MockBehavior::Text(text) => text,
            MockBehavior::Classify { category, confidence } => {
                format!("{} | {:?}", category, confidence).to_lowercase()
            }
            _ => String::new(),
        })
    }
}
