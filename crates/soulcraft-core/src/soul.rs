//! Soul: the single durable aggregate persisted across synthesis runs

use crate::aggregate::{Axiom, AxiomTier, Principle};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const SOUL_SCHEMA_VERSION: u32 = 1;

/// How a run folds new evidence into the prior state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleMode {
    /// No prior state.
    Initial,
    /// Merge new signals into the existing principle set.
    Incremental,
    /// Re-derive everything from all known signals.
    FullResynthesis,
}

impl fmt::Display for CycleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleMode::Initial => "initial",
            CycleMode::Incremental => "incremental",
            CycleMode::FullResynthesis => "full-resynthesis",
        })
    }
}

/// Why a run chose full re-synthesis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResynthesisTrigger {
    Forced,
    NewEvidenceRatio { ratio: f64, threshold: f64 },
    Contradictions { count: usize, threshold: usize },
    HierarchyChanged,
}

impl fmt::Display for ResynthesisTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResynthesisTrigger::Forced => write!(f, "forced by caller"),
            ResynthesisTrigger::NewEvidenceRatio { ratio, threshold } => write!(
                f,
                "new evidence ratio {:.0}% exceeds {:.0}%",
                ratio * 100.0,
                threshold * 100.0
            ),
            ResynthesisTrigger::Contradictions { count, threshold } => {
                write!(f, "{} contradictions (threshold {})", count, threshold)
            }
            ResynthesisTrigger::HierarchyChanged => write!(f, "dimension hierarchy changed"),
        }
    }
}

/// The decision recorded for the run that produced a soul.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub mode: CycleMode,
    #[serde(default)]
    pub triggers: Vec<ResynthesisTrigger>,
    pub new_evidence_ratio: f64,
    pub contradiction_count: usize,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Soul {
    pub schema_version: u32,
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub cycle_count: u32,
    pub principles: Vec<Principle>,
    pub axioms: Vec<Axiom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleRecord>,
}

impl Soul {
    pub fn new(principles: Vec<Principle>, axioms: Vec<Axiom>) -> Self {
        Self {
            schema_version: SOUL_SCHEMA_VERSION,
            id: format!("soul_{}", uuid::Uuid::new_v4().simple()),
            updated_at: Utc::now(),
            cycle_count: 1,
            principles,
            axioms,
            last_cycle: None,
        }
    }

    /// The state that succeeds `previous`: same id, bumped cycle count.
    pub fn succeed(previous: Option<&Soul>, principles: Vec<Principle>, axioms: Vec<Axiom>) -> Self {
        let mut soul = Self::new(principles, axioms);
        if let Some(prev) = previous {
            soul.id = prev.id.clone();
            soul.cycle_count = prev.cycle_count.saturating_add(1);
        }
        soul
    }

    /// Structural checks applied to any soul read from disk.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SOUL_SCHEMA_VERSION {
            return Err(Error::invalid_state(format!(
                "schema version {} (expected {})",
                self.schema_version, SOUL_SCHEMA_VERSION
            )));
        }
        if self.id.trim().is_empty() {
            return Err(Error::invalid_state("empty soul id"));
        }

        let mut ids = HashSet::new();
        for p in &self.principles {
            if !ids.insert(p.id.as_str()) {
                return Err(Error::invalid_state(format!("duplicate principle id {}", p.id)));
            }
            if p.n_count as usize != p.provenance.len() {
                return Err(Error::invalid_state(format!(
                    "principle {} has n_count {} but {} provenance entries",
                    p.id,
                    p.n_count,
                    p.provenance.len()
                )));
            }
            if !(0.0..=1.0).contains(&p.strength) {
                return Err(Error::invalid_state(format!(
                    "principle {} strength {} out of range",
                    p.id, p.strength
                )));
            }
        }

        let mut axiom_ids = HashSet::new();
        for a in &self.axioms {
            if !axiom_ids.insert(a.id.as_str()) {
                return Err(Error::invalid_state(format!("duplicate axiom id {}", a.id)));
            }
            if a.tier != AxiomTier::from_n_count(a.n_count) {
                return Err(Error::invalid_state(format!(
                    "axiom {} tier {:?} disagrees with n_count {}",
                    a.id, a.tier, a.n_count
                )));
            }
        }
        Ok(())
    }

    /// Every signal id already folded into a principle.
    pub fn processed_signal_ids(&self) -> HashSet<String> {
        self.principles
            .iter()
            .flat_map(|p| p.signal_ids().map(str::to_string))
            .collect()
    }
}
