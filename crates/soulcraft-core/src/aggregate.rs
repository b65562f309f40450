//! Principles (reinforced clusters) and Axioms (promoted statements)

use crate::types::{ArtifactProvenance, Signal, SignalImportance, SignalStance, SoulDimension, SourceLocator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How central a principle is, derived from the share of core-importance signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Centrality {
    Defining,
    Significant,
    Contextual,
}

impl Centrality {
    pub fn from_core_ratio(ratio: f64) -> Self {
        if ratio >= 0.5 {
            Centrality::Defining
        } else if ratio >= 0.2 {
            Centrality::Significant
        } else {
            Centrality::Contextual
        }
    }
}

/// One contributing signal. Sub-fields are copied from the signal when known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub signal_id: String,
    /// Match confidence that routed the signal here (1.0 for the seed).
    pub similarity: f64,
    pub source: SourceLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance: Option<SignalStance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<SignalImportance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ArtifactProvenance>,
}

impl ProvenanceEntry {
    pub fn from_signal(signal: &Signal, similarity: f64) -> Self {
        Self {
            signal_id: signal.id.clone(),
            similarity,
            source: signal.source.clone(),
            stance: Some(signal.stance),
            importance: Some(signal.importance),
            provenance: Some(signal.provenance),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipleEventKind {
    Created,
    Reinforced,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrincipleEvent {
    pub kind: PrincipleEventKind,
    pub signal_id: String,
    pub similarity: f64,
    pub n_count: u32,
    pub strength: f64,
    pub at: DateTime<Utc>,
}

/// A semantic cluster of reinforcing signals.
///
/// `n_count` always equals `provenance.len()`; provenance is append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principle {
    pub id: String,
    /// Representative text (the seeding signal's text).
    pub text: String,
    pub dimension: SoulDimension,
    pub n_count: u32,
    pub strength: f64,
    pub centrality: Centrality,
    pub provenance: Vec<ProvenanceEntry>,
    #[serde(default)]
    pub history: Vec<PrincipleEvent>,
}

impl Principle {
    /// Seed a new principle from a single signal.
    pub fn seed(id: impl Into<String>, signal: &Signal) -> Self {
        let mut principle = Self {
            id: id.into(),
            text: signal.text.clone(),
            dimension: signal.dimension,
            n_count: 1,
            strength: signal.confidence.clamp(0.0, 1.0),
            centrality: Centrality::Contextual,
            provenance: vec![ProvenanceEntry::from_signal(signal, 1.0)],
            history: Vec::new(),
        };
        principle.centrality = principle.computed_centrality();
        principle.record(PrincipleEventKind::Created, &signal.id, 1.0);
        principle
    }

    /// Fold a matched signal into this cluster.
    pub fn reinforce(&mut self, signal: &Signal, similarity: f64) {
        self.provenance.push(ProvenanceEntry::from_signal(signal, similarity));
        self.n_count += 1;
        let increment = signal.confidence * 0.1 * signal.importance.weight();
        self.strength = (self.strength + increment).min(1.0);
        self.centrality = self.computed_centrality();
        self.record(PrincipleEventKind::Reinforced, &signal.id, similarity);
    }

    fn record(&mut self, kind: PrincipleEventKind, signal_id: &str, similarity: f64) {
        self.history.push(PrincipleEvent {
            kind,
            signal_id: signal_id.to_string(),
            similarity,
            n_count: self.n_count,
            strength: self.strength,
            at: Utc::now(),
        });
    }

    /// Share of contributing signals marked core-importance.
    pub fn core_ratio(&self) -> f64 {
        if self.provenance.is_empty() {
            return 0.0;
        }
        let core = self
            .provenance
            .iter()
            .filter(|p| p.importance == Some(SignalImportance::Core))
            .count();
        core as f64 / self.provenance.len() as f64
    }

    pub fn computed_centrality(&self) -> Centrality {
        Centrality::from_core_ratio(self.core_ratio())
    }

    /// Number of distinct artifact provenance categories among contributing signals.
    pub fn provenance_diversity(&self) -> usize {
        self.provenance
            .iter()
            .filter_map(|p| p.provenance)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Whether any contributing signal is external or questioning.
    pub fn has_external_or_questioning(&self) -> bool {
        self.provenance.iter().any(|p| {
            p.provenance == Some(ArtifactProvenance::External)
                || p.stance.is_some_and(SignalStance::is_questioning)
        })
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = &str> {
        self.provenance.iter().map(|p| p.signal_id.as_str())
    }
}

/// Promotion tier, a pure function of a principle's true `n_count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxiomTier {
    Core,
    Domain,
    Emerging,
}

impl AxiomTier {
    pub fn from_n_count(n_count: u32) -> Self {
        if n_count >= 5 {
            AxiomTier::Core
        } else if n_count >= 3 {
            AxiomTier::Domain
        } else {
            AxiomTier::Emerging
        }
    }

    /// Sort rank: core < domain < emerging.
    pub fn rank(self) -> u8 {
        match self {
            AxiomTier::Core => 0,
            AxiomTier::Domain => 1,
            AxiomTier::Emerging => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalForms {
    pub native: String,
    pub notated: String,
}

impl CanonicalForms {
    pub fn new(text: &str, dimension: SoulDimension) -> Self {
        let native = text.trim().to_string();
        let notated = format!("[{}] {}", dimension.code(), native.trim_end_matches('.'));
        Self { native, notated }
    }
}

/// Snapshot of a contributing principle at promotion time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrincipleSnapshot {
    pub id: String,
    pub text: String,
    pub n_count: u32,
    pub strength: f64,
    pub centrality: Centrality,
}

impl From<&Principle> for PrincipleSnapshot {
    fn from(p: &Principle) -> Self {
        Self {
            id: p.id.clone(),
            text: p.text.clone(),
            n_count: p.n_count,
            strength: p.strength,
            centrality: p.centrality,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensionSeverity {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxiomTension {
    /// Peer axiom id.
    pub axiom_id: String,
    pub description: String,
    pub severity: TensionSeverity,
}

/// A principle promoted into a tiered identity statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axiom {
    pub id: String,
    pub text: String,
    pub tier: AxiomTier,
    pub dimension: SoulDimension,
    pub canonical: CanonicalForms,
    pub n_count: u32,
    pub derived_from: Vec<PrincipleSnapshot>,
    pub promotable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_blocker: Option<String>,
    pub provenance_diversity: usize,
    pub promoted_at: DateTime<Utc>,
    #[serde(default)]
    pub tensions: Vec<AxiomTension>,
}

impl Axiom {
    /// Merge tensions in, de-duplicating by peer axiom id.
    pub fn merge_tensions(&mut self, incoming: impl IntoIterator<Item = AxiomTension>) {
        for tension in incoming {
            if tension.axiom_id == self.id {
                continue;
            }
            if !self.tensions.iter().any(|t| t.axiom_id == tension.axiom_id) {
                self.tensions.push(tension);
            }
        }
    }
}
