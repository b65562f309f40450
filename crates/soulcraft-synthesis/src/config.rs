//! Synthesis configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use soulcraft_llm::RetryPolicy;
use std::path::Path;
use std::time::Duration;

/// Top-level synthesis configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Semantic matching of signals onto principles.
    pub matching: MatchingConfig,
    /// Cascade, anti-echo-chamber gate and cognitive-load cap.
    pub promotion: PromotionConfig,
    /// Pairwise conflict detection between axioms.
    pub tension: TensionConfig,
    /// Incremental vs full re-synthesis decision.
    pub cycle: CycleConfig,
    /// Attribute classification of raw signals.
    pub classify: ClassifyConfig,
    /// Timeout and backoff for every classifier call.
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum match confidence to reinforce an existing principle (0.7 - 0.85).
    pub threshold: f64,
    /// Concurrent pairwise comparisons when the batch answer is unusable.
    pub pairwise_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_principle_count: u32,
    pub min_provenance_diversity: usize,
    pub require_external_or_questioning: bool,
    /// Maximum axioms kept after promotion; the rest are returned as pruned.
    pub cognitive_load_cap: usize,
    /// N-thresholds tried strictest first.
    pub cascade_thresholds: Vec<u32>,
    /// Yield a cascade level must reach to be accepted.
    pub min_axiom_target: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensionConfig {
    /// Above this many axioms, pairwise detection is skipped.
    pub max_axioms: usize,
    /// Pairs evaluated per batch.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Novel-principle share of the existing set that forces full re-synthesis.
    pub new_evidence_ratio: f64,
    /// Contradictions that force full re-synthesis.
    pub contradiction_count: usize,
    /// Token-Jaccard below which a new principle counts as novel.
    pub novelty_similarity: f64,
    /// Token-Jaccard above which a polarity mismatch counts as a contradiction.
    pub contradiction_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Asks per attribute before falling back to the conservative default.
    pub max_attempts: u32,
    /// Signals classified per batch.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

// ============================================================
// Defaults
// ============================================================

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { threshold: 0.75, pairwise_concurrency: 5 }
    }
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_principle_count: 3,
            min_provenance_diversity: 2,
            require_external_or_questioning: true,
            cognitive_load_cap: 25,
            cascade_thresholds: vec![3, 2, 1],
            min_axiom_target: 3,
        }
    }
}

impl Default for TensionConfig {
    fn default() -> Self {
        Self { max_axioms: 25, concurrency: 5 }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            new_evidence_ratio: 0.3,
            contradiction_count: 2,
            novelty_similarity: 0.7,
            contradiction_similarity: 0.5,
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self { max_attempts: 3, concurrency: 10 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, timeout_secs: 30 }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: c.max_attempts.max(1),
            base_delay: Duration::from_millis(c.base_delay_ms),
            timeout: Duration::from_secs(c.timeout_secs.max(1)),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl SynthesisConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<SynthesisConfig>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config.sanitized()
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Clamp values into their supported ranges.
    pub fn sanitized(mut self) -> Self {
        let threshold = self.matching.threshold.clamp(0.7, 0.85);
        if threshold != self.matching.threshold {
            tracing::warn!(
                "matching.threshold {} outside 0.7-0.85, using {}",
                self.matching.threshold,
                threshold
            );
            self.matching.threshold = threshold;
        }
        self.matching.pairwise_concurrency = self.matching.pairwise_concurrency.max(1);
        self.tension.concurrency = self.tension.concurrency.max(1);
        self.classify.concurrency = self.classify.concurrency.max(1);
        self.classify.max_attempts = self.classify.max_attempts.max(1);
        self.promotion.cascade_thresholds.retain(|t| *t >= 1);
        self.promotion.cascade_thresholds.sort_unstable_by(|a, b| b.cmp(a));
        self.promotion.cascade_thresholds.dedup();
        if self.promotion.cascade_thresholds.is_empty() {
            self.promotion.cascade_thresholds = PromotionConfig::default().cascade_thresholds;
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
