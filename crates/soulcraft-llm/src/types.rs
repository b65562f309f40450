//! LLM types for requests, streaming responses, and categorical classification

use serde::{Deserialize, Serialize};

/// LLM request
#[derive(Clone, Debug, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".to_string(),
            messages: Vec::new(),
            max_tokens: Some(1024),
            temperature: Some(0.0),
            system: None,
        }
    }
}

impl LlmRequest {
    /// Single-turn request with one user message.
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![LlmMessage {
                role: "user".to_string(),
                content: prompt.into(),
            }],
            ..Default::default()
        }
    }
}

/// Message in LLM conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

/// Streaming delta from LLM
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
    Done { stop_reason: Option<String>, usage: Option<Usage> },
    Error(String),
}

/// Token usage
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Categorical confidence as reported by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Quantized numeric confidence.
    pub fn score(self) -> f64 {
        match self {
            ConfidenceLevel::High => 0.9,
            ConfidenceLevel::Medium => 0.7,
            ConfidenceLevel::Low => 0.5,
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase().as_str() {
            "high" => Some(ConfidenceLevel::High),
            "medium" | "moderate" => Some(ConfidenceLevel::Medium),
            "low" => Some(ConfidenceLevel::Low),
            _ => None,
        }
    }
}

/// Result of `classify`: the chosen category (None when the answer named none of
/// the offered categories) and the quantized confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub category: Option<String>,
    pub confidence: f64,
}

impl Classification {
    pub fn new(category: impl Into<String>, level: ConfidenceLevel) -> Self {
        Self {
            category: Some(category.into()),
            confidence: level.score(),
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            category: None,
            confidence: 0.0,
        }
    }
}

/// Build the prompt sent for a categorical classification.
pub fn classification_prompt(prompt: &str, categories: &[&str]) -> String {
    format!(
        "{}\n\nCategories: {}\n\nAnswer on a single line as `<category> | <confidence>` where \
         <category> is exactly one of the categories above and <confidence> is high, medium, or low.",
        prompt,
        categories.join(", ")
    )
}

fn word_positions<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    haystack.match_indices(needle).filter_map(move |(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + needle.len()..].chars().next();
        let is_boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric() && c != '-');
        (is_boundary(before) && is_boundary(after)).then_some(idx)
    })
}

/// Find the earliest whole-word category mention in `text`.
fn find_category(text: &str, categories: &[&str]) -> Option<String> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, &str)> = None;
    for category in categories {
        let needle = category.to_lowercase();
        let found = word_positions(&lower, &needle).next();
        if let Some(pos) = found {
            let better = match best {
                None => true,
                Some((best_pos, best_cat)) => {
                    pos < best_pos || (pos == best_pos && category.len() > best_cat.len())
                }
            };
            if better {
                best = Some((pos, category));
            }
        }
    }
    best.map(|(_, c)| c.to_string())
}

/// Parse a `<category> | <confidence>` answer, tolerating prose around it.
pub fn parse_classification(response: &str, categories: &[&str]) -> Classification {
    let line = response
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let (category_part, confidence_part) = match line.split_once('|') {
        Some((c, conf)) => (c, Some(conf)),
        None => (line, None),
    };

    let category = find_category(category_part, categories).or_else(|| find_category(response, categories));
    let Some(category) = category else {
        return Classification::unrecognized();
    };

    let level = confidence_part
        .and_then(ConfidenceLevel::from_word)
        .or_else(|| {
            response
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.eq_ignore_ascii_case(&category))
                .find_map(ConfidenceLevel::from_word)
        })
        .unwrap_or(ConfidenceLevel::Medium);

    Classification {
        category: Some(category),
        confidence: level.score(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_piped_answer() {
        let c = parse_classification("deny | high", &["assert", "deny", "question"]);
        assert_eq!(c.category.as_deref(), Some("deny"));
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn picks_earliest_mention() {
        let c = parse_classification(
            "This reads as a question rather than assert. Confidence: low",
            &["assert", "question"],
        );
        assert_eq!(c.category.as_deref(), Some("question"));
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn whole_word_only() {
        // "core" must not match inside "identity-core"
        let c = parse_classification("identity-core | medium", &["core", "identity-core"]);
        assert_eq!(c.category.as_deref(), Some("identity-core"));
    }

    #[test]
    fn category_matching_ignores_case() {
        let c = parse_classification("I would say HONESTY-FRAMEWORK | Low", &["Identity-Core", "Honesty-Framework"]);
        assert_eq!(c.category.as_deref(), Some("Honesty-Framework"));
        assert_eq!(c.confidence, 0.5);
    }

    #[test]
    fn unknown_category_is_unrecognized() {
        let c = parse_classification("banana | high", &["assert", "deny"]);
        assert!(c.category.is_none());
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn missing_confidence_defaults_to_medium() {
        let c = parse_classification("assert", &["assert", "deny"]);
        assert_eq!(c.confidence, 0.7);
    }

    #[test]
    fn categories_that_are_confidence_words() {
        let c = parse_classification("low | high", &["high", "medium", "low", "none"]);
        assert_eq!(c.category.as_deref(), Some("low"));
        assert_eq!(c.confidence, 0.9);
    }
}
