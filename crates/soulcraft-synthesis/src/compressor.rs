//! Compressor: promotes principles into tiered axioms
//!
//! Three stages, each observable in the result:
//! 1. Cascade: pick the strictest N-threshold that still yields enough axioms.
//! 2. Gate: every candidate is checked against the anti-echo-chamber rules and
//!    carries a blocker when it fails. Failing candidates are kept, never dropped.
//! 3. Cap: above the cognitive-load limit the weakest axioms move to `pruned`.

use crate::config::PromotionConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use soulcraft_core::{Axiom, AxiomTier, CanonicalForms, Principle, PrincipleSnapshot};
use std::fmt;
use tracing::{info, warn};

/// Hard ceiling for the load guardrail regardless of signal volume.
const LOAD_GUARDRAIL_CEILING: f64 = 30.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CascadeLevel {
    pub threshold: u32,
    pub qualifying: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub effective_threshold: u32,
    /// Levels evaluated, strictest first, up to and including the accepted one.
    pub levels: Vec<CascadeLevel>,
    /// True when no level reached the target and the cascade settled at 1.
    pub fell_back: bool,
}

/// Observability warnings. They never block promotion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Guardrail {
    /// More axioms than input signals.
    Expansion { axioms: usize, signals: usize },
    /// More axioms than a reader can hold.
    CognitiveLoad { axioms: usize, limit: usize },
    /// Cascade settled at N=1.
    CascadeFallback,
}

impl fmt::Display for Guardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guardrail::Expansion { axioms, signals } => {
                write!(f, "expansion: {} axioms from {} signals", axioms, signals)
            }
            Guardrail::CognitiveLoad { axioms, limit } => {
                write!(f, "cognitive load: {} axioms exceeds {}", axioms, limit)
            }
            Guardrail::CascadeFallback => {
                write!(f, "cascade fell back to N=1; axioms rest on single signals")
            }
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompressionResult {
    pub axioms: Vec<Axiom>,
    /// Axioms removed by the cognitive-load cap, strongest first.
    pub pruned: Vec<Axiom>,
    /// Principle ids below the effective threshold.
    pub unconverged: Vec<String>,
    pub cascade: Option<CascadeOutcome>,
    pub guardrails: Vec<Guardrail>,
}

impl CompressionResult {
    pub fn effective_threshold(&self) -> Option<u32> {
        self.cascade.as_ref().map(|c| c.effective_threshold)
    }

    pub fn promotable_count(&self) -> usize {
        self.axioms.iter().filter(|a| a.promotable).count()
    }
}

// ============================================================
// Cascade
// ============================================================

/// Strictest threshold whose qualifying count reaches `min_target`, else 1.
pub fn select_threshold(principles: &[Principle], thresholds: &[u32], min_target: usize) -> CascadeOutcome {
    let mut levels = Vec::new();
    for &threshold in thresholds {
        let qualifying = principles.iter().filter(|p| p.n_count >= threshold).count();
        levels.push(CascadeLevel { threshold, qualifying });
        if qualifying >= min_target {
            return CascadeOutcome {
                effective_threshold: threshold,
                levels,
                fell_back: false,
            };
        }
    }
    CascadeOutcome {
        effective_threshold: 1,
        levels,
        fell_back: true,
    }
}

// ============================================================
// Gate
// ============================================================

/// First failing anti-echo-chamber rule, if any.
pub fn promotion_blocker(principle: &Principle, config: &PromotionConfig) -> Option<String> {
    if principle.n_count < config.min_principle_count {
        return Some(format!(
            "insufficient evidence: {} signals (need {})",
            principle.n_count, config.min_principle_count
        ));
    }
    let diversity = principle.provenance_diversity();
    if diversity < config.min_provenance_diversity {
        return Some(format!(
            "insufficient diversity: {} provenance categories (need {})",
            diversity, config.min_provenance_diversity
        ));
    }
    if config.require_external_or_questioning && !principle.has_external_or_questioning() {
        return Some("requires external or questioning evidence".to_string());
    }
    None
}

fn axiom_from(principle: &Principle, config: &PromotionConfig) -> Axiom {
    let blocker = promotion_blocker(principle, config);
    Axiom {
        id: format!("ax_{}", uuid::Uuid::new_v4().simple()),
        text: principle.text.clone(),
        tier: AxiomTier::from_n_count(principle.n_count),
        dimension: principle.dimension,
        canonical: CanonicalForms::new(&principle.text, principle.dimension),
        n_count: principle.n_count,
        derived_from: vec![PrincipleSnapshot::from(principle)],
        promotable: blocker.is_none(),
        promotion_blocker: blocker,
        provenance_diversity: principle.provenance_diversity(),
        promoted_at: Utc::now(),
        tensions: Vec::new(),
    }
}

// ============================================================
// Cap
// ============================================================

/// Keep the `cap` strongest axioms; the rest are returned, never discarded.
pub fn apply_cognitive_load_cap(mut axioms: Vec<Axiom>, cap: usize) -> (Vec<Axiom>, Vec<Axiom>) {
    if axioms.len() <= cap {
        return (axioms, Vec::new());
    }
    axioms.sort_by(|a, b| {
        b.n_count
            .cmp(&a.n_count)
            .then_with(|| a.tier.rank().cmp(&b.tier.rank()))
    });
    let pruned = axioms.split_off(cap);
    (axioms, pruned)
}

fn guardrails_for(axiom_count: usize, signal_count: usize, cascade: &CascadeOutcome) -> Vec<Guardrail> {
    let mut guardrails = Vec::new();
    if axiom_count > signal_count {
        guardrails.push(Guardrail::Expansion {
            axioms: axiom_count,
            signals: signal_count,
        });
    }
    let limit = (signal_count as f64 * 0.5).min(LOAD_GUARDRAIL_CEILING);
    if axiom_count as f64 > limit {
        guardrails.push(Guardrail::CognitiveLoad {
            axioms: axiom_count,
            limit: limit.floor() as usize,
        });
    }
    if cascade.effective_threshold <= 1 {
        guardrails.push(Guardrail::CascadeFallback);
    }
    guardrails
}

/// Run cascade, gate and cap over a principle set built from `signal_count` signals.
pub fn compress(principles: &[Principle], signal_count: usize, config: &PromotionConfig) -> CompressionResult {
    if principles.is_empty() {
        return CompressionResult::default();
    }

    let cascade = select_threshold(principles, &config.cascade_thresholds, config.min_axiom_target);
    let n = cascade.effective_threshold;

    let mut candidates = Vec::new();
    let mut unconverged = Vec::new();
    for principle in principles {
        if principle.n_count >= n {
            candidates.push(axiom_from(principle, config));
        } else {
            unconverged.push(principle.id.clone());
        }
    }

    for axiom in candidates.iter().filter(|a| !a.promotable) {
        if let Some(blocker) = &axiom.promotion_blocker {
            warn!("Axiom {} not promotable: {}", axiom.canonical.notated, blocker);
        }
    }

    let (axioms, pruned) = apply_cognitive_load_cap(candidates, config.cognitive_load_cap);
    if !pruned.is_empty() {
        warn!(
            "Cognitive-load cap {} pruned {} axioms",
            config.cognitive_load_cap,
            pruned.len()
        );
    }

    let guardrails = guardrails_for(axioms.len(), signal_count, &cascade);
    for guardrail in &guardrails {
        warn!("Guardrail: {}", guardrail);
    }

    info!(
        "Compressed {} principles into {} axioms at N>={} ({} pruned, {} unconverged)",
        principles.len(),
        axioms.len(),
        n,
        pruned.len(),
        unconverged.len()
    );

    CompressionResult {
        axioms,
        pruned,
        unconverged,
        cascade: Some(cascade),
        guardrails,
    }
}
