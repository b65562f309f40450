//! Cycle manager: decides whether a run merges into the existing soul or rebuilds it

use crate::config::CycleConfig;
use chrono::Utc;
use soulcraft_core::{CycleMode, CycleRecord, Principle, ResynthesisTrigger, Soul};
use std::collections::HashSet;
use tracing::info;

const NEGATION_MARKERS: [&str; 14] = [
    "not", "no", "never", "none", "nor", "neither", "don't", "dont", "cannot", "can't", "won't", "avoid",
    "without", "refuse",
];

#[derive(Clone, Debug, PartialEq)]
pub struct CycleDecision {
    pub mode: CycleMode,
    pub triggers: Vec<ResynthesisTrigger>,
    pub new_evidence_ratio: f64,
    pub contradiction_count: usize,
}

impl CycleDecision {
    fn plain(mode: CycleMode) -> Self {
        Self {
            mode,
            triggers: Vec::new(),
            new_evidence_ratio: 0.0,
            contradiction_count: 0,
        }
    }

    pub fn record(&self) -> CycleRecord {
        CycleRecord {
            mode: self.mode,
            triggers: self.triggers.clone(),
            new_evidence_ratio: self.new_evidence_ratio,
            contradiction_count: self.contradiction_count,
            decided_at: Utc::now(),
        }
    }
}

fn content_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3) // skip short words
        .collect()
}

fn all_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Token-Jaccard similarity over content words. Texts with no content words
/// score 1.0 when their words are identical and 0.0 otherwise.
pub fn token_similarity(text_a: &str, text_b: &str) -> f64 {
    let words_a = content_words(text_a);
    let words_b = content_words(text_b);

    if words_a.is_empty() || words_b.is_empty() {
        let (all_a, all_b) = (all_words(text_a), all_words(text_b));
        return if !all_a.is_empty() && all_a == all_b { 1.0 } else { 0.0 };
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    intersection as f64 / union as f64
}

pub fn has_negation(text: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .map(|w| w.replace('\u{2019}', "'").to_lowercase())
        .any(|w| NEGATION_MARKERS.contains(&w.as_str()) || w.ends_with("n't"))
}

/// New principles whose best similarity to every existing principle is below `novelty`.
pub fn count_novel(existing: &[Principle], new_principles: &[Principle], novelty: f64) -> usize {
    new_principles
        .iter()
        .filter(|np| existing.iter().all(|p| token_similarity(&p.text, &np.text) < novelty))
        .count()
}

/// Pairs (existing axiom, new principle) that overlap textually but disagree in polarity.
pub fn count_contradictions(existing: &Soul, new_principles: &[Principle], similarity: f64) -> usize {
    existing
        .axioms
        .iter()
        .flat_map(|a| new_principles.iter().map(move |p| (a, p)))
        .filter(|(a, p)| {
            token_similarity(&a.text, &p.text) > similarity && has_negation(&a.text) != has_negation(&p.text)
        })
        .count()
}

pub fn decide_cycle_mode(
    existing: Option<&Soul>,
    new_principles: &[Principle],
    config: &CycleConfig,
    hierarchy_changed: bool,
    force: bool,
) -> CycleDecision {
    if force {
        let mut decision = CycleDecision::plain(CycleMode::FullResynthesis);
        decision.triggers.push(ResynthesisTrigger::Forced);
        info!("Cycle mode: full-resynthesis (forced)");
        return decision;
    }

    let Some(soul) = existing else {
        info!("Cycle mode: initial (no prior soul)");
        return CycleDecision::plain(CycleMode::Initial);
    };

    let novel = count_novel(&soul.principles, new_principles, config.novelty_similarity);
    let new_evidence_ratio = if soul.principles.is_empty() {
        if novel > 0 { 1.0 } else { 0.0 }
    } else {
        novel as f64 / soul.principles.len() as f64
    };
    let contradiction_count = count_contradictions(soul, new_principles, config.contradiction_similarity);

    let mut triggers = Vec::new();
    if new_evidence_ratio > config.new_evidence_ratio {
        triggers.push(ResynthesisTrigger::NewEvidenceRatio {
            ratio: new_evidence_ratio,
            threshold: config.new_evidence_ratio,
        });
    }
    if contradiction_count >= config.contradiction_count {
        triggers.push(ResynthesisTrigger::Contradictions {
            count: contradiction_count,
            threshold: config.contradiction_count,
        });
    }
    if hierarchy_changed {
        triggers.push(ResynthesisTrigger::HierarchyChanged);
    }

    let mode = if triggers.is_empty() {
        CycleMode::Incremental
    } else {
        CycleMode::FullResynthesis
    };
    info!(
        "Cycle mode: {} (novel {}/{}, {} contradictions{})",
        mode,
        novel,
        soul.principles.len(),
        contradiction_count,
        if triggers.is_empty() {
            String::new()
        } else {
            format!(
                "; {}",
                triggers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            )
        }
    );

    CycleDecision {
        mode,
        triggers,
        new_evidence_ratio,
        contradiction_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_ignores_case_punctuation_and_short_words() {
        assert_eq!(token_similarity("Honesty matters.", "honesty MATTERS"), 1.0);
        assert_eq!(token_similarity("a is to", "be or it"), 0.0);
        assert_eq!(token_similarity("", ""), 0.0);
        let s = token_similarity("always tell the truth kindly", "always tell hard truth");
        assert!(s > 0.3 && s < 1.0);
    }

    #[test]
    fn identical_short_word_texts_are_similar() {
        assert_eq!(token_similarity("I am me", "i am me."), 1.0);
        assert_eq!(token_similarity("I am me", "I am you"), 0.0);
        assert_eq!(token_similarity("I am me", "honesty matters"), 0.0);
    }

    #[test]
    fn negation_markers() {
        assert!(has_negation("Never deceive people"));
        assert!(has_negation("I don't flatter"));
        assert!(has_negation("I don\u{2019}t flatter"));
        assert!(has_negation("Do not flatter"));
        assert!(!has_negation("Note the nuance"));
        assert!(!has_negation("Always be candid"));
    }
}
