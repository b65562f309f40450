//! Tests for soulcraft-llm: error classification, retry policy, mock provider

use soulcraft_llm::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

// ===========================================================================
// LlmError
// ===========================================================================

#[test]
fn transient_classification() {
    assert!(LlmError::RateLimited { retry_after_ms: 10 }.is_transient());
    assert!(LlmError::ServerError { status: 502, message: "bad gateway".into() }.is_transient());
    assert!(LlmError::Timeout(100).is_transient());
    assert!(LlmError::StreamError("reset".into()).is_transient());

    assert!(!LlmError::AuthFailed("nope".into()).is_transient());
    assert!(!LlmError::InvalidResponse("garbage".into()).is_transient());
    assert!(!LlmError::RequestFailed("400".into()).is_transient());
    assert!(!LlmError::Unavailable("no backend".into()).is_transient());
    assert!(!LlmError::Cancelled.is_transient());
}

#[test]
fn status_mapping() {
    assert!(matches!(LlmError::from_status(401, String::new()), LlmError::AuthFailed(_)));
    assert!(matches!(LlmError::from_status(429, String::new()), LlmError::RateLimited { .. }));
    assert!(matches!(
        LlmError::from_status(503, String::new()),
        LlmError::ServerError { status: 503, .. }
    ));
    assert!(matches!(LlmError::from_status(400, String::new()), LlmError::RequestFailed(_)));
}

#[test]
fn converts_into_core_error() {
    let e: soulcraft_core::Error = LlmError::Unavailable("down".into()).into();
    assert!(matches!(e, soulcraft_core::Error::MatcherUnavailable(_)));
    let e: soulcraft_core::Error = LlmError::AuthFailed("bad key".into()).into();
    assert!(e.to_string().contains("bad key"));
}

// ===========================================================================
// with_retry
// ===========================================================================

#[tokio::test]
async fn retries_transient_then_succeeds() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result = with_retry(&fast_policy(), "test", move || async move {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(LlmError::ServerError { status: 500, message: "boom".into() })
        } else {
            Ok("ok")
        }
    })
    .await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result: LlmResult<()> = with_retry(&fast_policy(), "test", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::AuthFailed("bad key".into()))
    })
    .await;
    assert!(matches!(result, Err(LlmError::AuthFailed(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_error_surfaces_after_bounded_attempts() {
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result: LlmResult<()> = with_retry(&fast_policy(), "test", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::RateLimited { retry_after_ms: 1 })
    })
    .await;
    assert!(matches!(result, Err(LlmError::RateLimited { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn slow_call_times_out() {
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        timeout: Duration::from_millis(20),
    };
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let result: LlmResult<()> = with_retry(&policy, "slow", move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;
    assert!(matches!(result, Err(LlmError::Timeout(20))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ===========================================================================
// MockProvider + RetryingProvider
// ===========================================================================

#[tokio::test]
async fn mock_sequence_consumed_in_order() {
    let mock = MockProvider::sequence(vec![
        MockBehavior::text("first"),
        MockBehavior::classify("deny", ConfidenceLevel::Low),
    ]);
    assert_eq!(mock.generate("a").await.unwrap(), "first");
    let c = mock.classify("b", &["assert", "deny"]).await.unwrap();
    assert_eq!(c.category.as_deref(), Some("deny"));
    assert_eq!(c.confidence, 0.5);
    assert_eq!(mock.generate("c").await.unwrap(), "(mock: sequence exhausted)");
    assert_eq!(mock.call_count().await, 3);
}

#[tokio::test]
async fn mock_text_is_parsed_for_classify() {
    let mock = MockProvider::constant(MockBehavior::text("question | high"));
    let c = mock.classify("p", &["assert", "question"]).await.unwrap();
    assert_eq!(c, Classification::new("question", ConfidenceLevel::High));
}

#[tokio::test]
async fn mock_from_fn_sees_prompt() {
    let mock = MockProvider::from_fn(|prompt| {
        if prompt.contains("kindness") {
            MockBehavior::text("yes")
        } else {
            MockBehavior::text("no")
        }
    });
    assert_eq!(mock.generate("about kindness").await.unwrap(), "yes");
    assert_eq!(mock.generate("about rigor").await.unwrap(), "no");
    assert_eq!(mock.prompts().await.len(), 2);
}

#[tokio::test]
async fn retrying_provider_recovers_from_transient_failures() {
    let mock = Arc::new(MockProvider::sequence(vec![
        MockBehavior::Transient("overloaded".into()),
        MockBehavior::text("recovered"),
    ]));
    let provider = RetryingProvider::new(mock.clone(), fast_policy());
    assert_eq!(provider.generate("x").await.unwrap(), "recovered");
    assert_eq!(mock.call_count().await, 2);
    assert_eq!(provider.name(), "mock");
}

#[tokio::test]
async fn retrying_provider_propagates_fatal_failures() {
    let mock = Arc::new(MockProvider::constant(MockBehavior::Fatal("revoked".into())));
    let provider = RetryingProvider::new(mock.clone(), fast_policy());
    let err = provider.classify("x", &["a"]).await.unwrap_err();
    assert!(matches!(err, LlmError::AuthFailed(_)));
    assert_eq!(mock.call_count().await, 1);
}

// ===========================================================================
// Prompts
// ===========================================================================

#[test]
fn classification_prompt_lists_categories() {
    let p = classification_prompt("Classify this.", &["core", "supporting", "peripheral"]);
    assert!(p.starts_with("Classify this."));
    assert!(p.contains("core, supporting, peripheral"));
}

#[test]
fn confidence_scores_are_quantized() {
    assert_eq!(ConfidenceLevel::High.score(), 0.9);
    assert_eq!(ConfidenceLevel::Medium.score(), 0.7);
    assert_eq!(ConfidenceLevel::Low.score(), 0.5);
    assert_eq!(ConfidenceLevel::from_word("Moderate"), Some(ConfidenceLevel::Medium));
}
