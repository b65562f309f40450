//! Semantic matcher: stateless comparator between a text and candidate texts
//!
//! One batch prompt lists every candidate; if the answer cannot be parsed the
//! matcher falls back to one categorical comparison per candidate.

use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use soulcraft_core::Result;
use soulcraft_llm::{ConfidenceLevel, LlmProvider};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchResult {
    pub index: usize,
    pub confidence: f64,
}

/// Comparator interface. Swap implementations (e.g. an ANN index) behind it.
#[async_trait::async_trait]
pub trait Matcher: Send + Sync {
    /// Best candidate for `text`, whatever its confidence. `None` when nothing matches at all.
    async fn find_best(&self, text: &str, candidates: &[&str]) -> Result<Option<MatchResult>>;

    /// Best candidate at or above `threshold`.
    async fn match_best(
        &self,
        text: &str,
        candidates: &[&str],
        threshold: f64,
    ) -> Result<Option<MatchResult>> {
        Ok(self
            .find_best(text, candidates)
            .await?
            .filter(|m| m.confidence >= threshold))
    }
}

const PAIR_CATEGORIES: [&str; 4] = ["high", "medium", "low", "none"];

#[derive(Debug, PartialEq)]
enum BatchAnswer {
    Match(MatchResult),
    NoMatch,
    Malformed,
}

fn batch_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\D*?(\d+)\b.*?\b(high|medium|low)\b").ok())
        .as_ref()
}

fn parse_batch_answer(response: &str, candidate_count: usize) -> BatchAnswer {
    let line = response
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_lowercase();
    let line = line.trim_start_matches(|c: char| !c.is_alphanumeric());

    if line.starts_with("none") || line.starts_with("no match") {
        return BatchAnswer::NoMatch;
    }

    let Some(caps) = batch_pattern().and_then(|re| re.captures(line)) else {
        return BatchAnswer::Malformed;
    };
    let index = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
    let level = caps.get(2).and_then(|m| ConfidenceLevel::from_word(m.as_str()));
    match (index, level) {
        (Some(i), Some(level)) if (1..=candidate_count).contains(&i) => BatchAnswer::Match(MatchResult {
            index: i - 1,
            confidence: level.score(),
        }),
        _ => BatchAnswer::Malformed,
    }
}

fn batch_prompt(text: &str, candidates: &[&str]) -> String {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Statement: {}\n\nCandidates:\n{}\n\nWhich candidate expresses the same underlying principle \
         as the statement? Answer on a single line as `<number> | <confidence>` where <confidence> \
         is high, medium, or low. Answer `none` if no candidate expresses it.",
        text, listing
    )
}

fn pair_prompt(text: &str, candidate: &str) -> String {
    format!(
        "Do these two statements express the same underlying principle?\n\nA: {}\nB: {}\n\n\
         Rate the semantic equivalence.",
        text, candidate
    )
}

fn pair_score(category: Option<&str>) -> f64 {
    category
        .and_then(ConfidenceLevel::from_word)
        .map(ConfidenceLevel::score)
        .unwrap_or(0.0)
}

/// Matcher backed by an injected classifier.
pub struct LlmMatcher {
    provider: Arc<dyn LlmProvider>,
    pairwise_concurrency: usize,
}

impl LlmMatcher {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, pairwise_concurrency: 5 }
    }

    pub fn with_pairwise_concurrency(mut self, n: usize) -> Self {
        self.pairwise_concurrency = n.max(1);
        self
    }

    async fn find_best_pairwise(&self, text: &str, candidates: &[&str]) -> Result<Option<MatchResult>> {
        let prompts: Vec<String> = candidates.iter().map(|c| pair_prompt(text, c)).collect();
        let scores: Vec<f64> = stream::iter(prompts)
            .map(|prompt| {
                let provider = self.provider.clone();
                async move {
                    let c = provider.classify(&prompt, &PAIR_CATEGORIES).await?;
                    Ok::<f64, soulcraft_core::Error>(pair_score(c.category.as_deref()))
                }
            })
            .buffered(self.pairwise_concurrency)
            .try_collect()
            .await?;

        let mut best: Option<MatchResult> = None;
        for (index, confidence) in scores.into_iter().enumerate() {
            if confidence <= 0.0 {
                continue;
            }
            if best.map_or(true, |b| confidence > b.confidence) {
                best = Some(MatchResult { index, confidence });
            }
        }
        Ok(best)
    }
}

#[async_trait::async_trait]
impl Matcher for LlmMatcher {
    async fn find_best(&self, text: &str, candidates: &[&str]) -> Result<Option<MatchResult>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let response = self.provider.generate(&batch_prompt(text, candidates)).await?;
        match parse_batch_answer(&response, candidates.len()) {
            BatchAnswer::Match(m) => {
                debug!("Batch match: candidate {} at {:.2}", m.index, m.confidence);
                Ok(Some(m))
            }
            BatchAnswer::NoMatch => Ok(None),
            BatchAnswer::Malformed => {
                warn!(
                    "Unparseable batch match answer ({} chars), comparing {} candidates pairwise",
                    response.len(),
                    candidates.len()
                );
                self.find_best_pairwise(text, candidates).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_answer() {
        assert_eq!(
            parse_batch_answer("2 | high", 3),
            BatchAnswer::Match(MatchResult { index: 1, confidence: 0.9 })
        );
    }

    #[test]
    fn parses_wordy_answer() {
        assert_eq!(
            parse_batch_answer("Candidate 3 (confidence: medium)\nbecause...", 3),
            BatchAnswer::Match(MatchResult { index: 2, confidence: 0.7 })
        );
    }

    #[test]
    fn none_is_a_valid_answer() {
        assert_eq!(parse_batch_answer("None.", 3), BatchAnswer::NoMatch);
        assert_eq!(parse_batch_answer("no match", 3), BatchAnswer::NoMatch);
    }

    #[test]
    fn out_of_range_index_is_malformed() {
        assert_eq!(parse_batch_answer("7 | high", 3), BatchAnswer::Malformed);
        assert_eq!(parse_batch_answer("0 | high", 3), BatchAnswer::Malformed);
    }

    #[test]
    fn missing_confidence_is_malformed() {
        assert_eq!(parse_batch_answer("2", 3), BatchAnswer::Malformed);
        assert_eq!(parse_batch_answer("I think they are similar", 3), BatchAnswer::Malformed);
    }

    #[test]
    fn pair_scores_are_quantized() {
        assert_eq!(pair_score(Some("high")), 0.9);
        assert_eq!(pair_score(Some("medium")), 0.7);
        assert_eq!(pair_score(Some("low")), 0.5);
        assert_eq!(pair_score(Some("none")), 0.0);
        assert_eq!(pair_score(None), 0.0);
    }
}
