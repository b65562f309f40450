//! Principle store: online clustering of signals into reinforced principles
//!
//! Principles live in an arena (`Vec<Principle>`) with an id → index map.
//! Every signal is compared against all representative texts; a match at or
//! above the threshold reinforces that principle, anything else seeds a new one.
//! Mutation goes through `&mut self`, so two signals can never race onto the
//! same cluster.

use crate::matcher::Matcher;
use soulcraft_core::{OrphanedSignal, Principle, Result, Signal};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddAction {
    Created,
    Reinforced,
    Skipped,
}

impl fmt::Display for AddAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddAction::Created => "created",
            AddAction::Reinforced => "reinforced",
            AddAction::Skipped => "skipped",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddOutcome {
    pub action: AddAction,
    /// Principle the signal landed in (None when skipped).
    pub principle_id: Option<String>,
    /// Best match confidence observed (1.0 for the bootstrap principle).
    pub similarity: f64,
}

pub struct PrincipleStore {
    matcher: Arc<dyn Matcher>,
    threshold: f64,
    principles: Vec<Principle>,
    index: HashMap<String, usize>,
    processed: HashSet<String>,
    orphans: Vec<OrphanedSignal>,
}

fn new_principle_id() -> String {
    format!("pr_{}", uuid::Uuid::new_v4().simple())
}

impl PrincipleStore {
    pub fn new(matcher: Arc<dyn Matcher>, threshold: f64) -> Self {
        Self {
            matcher,
            threshold,
            principles: Vec::new(),
            index: HashMap::new(),
            processed: HashSet::new(),
            orphans: Vec::new(),
        }
    }

    /// Resume from previously persisted principles. Signals already folded into
    /// them count as processed.
    pub fn with_principles(matcher: Arc<dyn Matcher>, threshold: f64, principles: Vec<Principle>) -> Self {
        let mut store = Self::new(matcher, threshold);
        for principle in principles {
            store.processed.extend(principle.signal_ids().map(str::to_string));
            store.index.insert(principle.id.clone(), store.principles.len());
            store.principles.push(principle);
        }
        store
    }

    /// Route one signal. Matcher errors propagate unmodified and leave the store untouched.
    pub async fn add_signal(&mut self, signal: &Signal) -> Result<AddOutcome> {
        if self.processed.contains(&signal.id) {
            debug!("Signal {} already processed, skipping", signal.id);
            return Ok(AddOutcome {
                action: AddAction::Skipped,
                principle_id: None,
                similarity: 0.0,
            });
        }

        if self.principles.is_empty() {
            let id = self.insert(Principle::seed(new_principle_id(), signal));
            self.processed.insert(signal.id.clone());
            debug!("Signal {} bootstrapped principle {}", signal.id, id);
            return Ok(AddOutcome {
                action: AddAction::Created,
                principle_id: Some(id),
                similarity: 1.0,
            });
        }

        let best = {
            let candidates: Vec<&str> = self.principles.iter().map(|p| p.text.as_str()).collect();
            self.matcher.find_best(&signal.text, &candidates).await?
        };

        let outcome = match best {
            Some(m) if m.confidence >= self.threshold && m.index < self.principles.len() => {
                let principle = &mut self.principles[m.index];
                principle.reinforce(signal, m.confidence);
                debug!(
                    "Signal {} reinforced {} (n={}, similarity {:.2})",
                    signal.id, principle.id, principle.n_count, m.confidence
                );
                AddOutcome {
                    action: AddAction::Reinforced,
                    principle_id: Some(principle.id.clone()),
                    similarity: m.confidence,
                }
            }
            _ => {
                let (best_similarity, closest) = match best {
                    Some(m) => (m.confidence, self.principles.get(m.index).map(|p| p.id.clone())),
                    None => (0.0, None),
                };
                let id = self.insert(Principle::seed(new_principle_id(), signal));
                debug!(
                    "Signal {} below threshold ({:.2} < {:.2}), seeded {}",
                    signal.id, best_similarity, self.threshold, id
                );
                self.orphans.push(OrphanedSignal {
                    signal: signal.clone(),
                    best_similarity,
                    closest_principle_id: closest,
                    seeded_principle_id: id.clone(),
                });
                AddOutcome {
                    action: AddAction::Created,
                    principle_id: Some(id),
                    similarity: best_similarity,
                }
            }
        };

        self.processed.insert(signal.id.clone());
        Ok(outcome)
    }

    /// Route signals in order. Stops at the first matcher failure.
    pub async fn add_signals(&mut self, signals: &[Signal]) -> Result<Vec<AddOutcome>> {
        let mut outcomes = Vec::with_capacity(signals.len());
        for signal in signals {
            outcomes.push(self.add_signal(signal).await?);
        }
        Ok(outcomes)
    }

    fn insert(&mut self, principle: Principle) -> String {
        let id = principle.id.clone();
        self.index.insert(id.clone(), self.principles.len());
        self.principles.push(principle);
        id
    }

    /// Affects future matching only; existing clusters keep their counts.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn get(&self, id: &str) -> Option<&Principle> {
        self.index.get(id).and_then(|&i| self.principles.get(i))
    }

    pub fn principles(&self) -> &[Principle] {
        &self.principles
    }

    pub fn orphans(&self) -> &[OrphanedSignal] {
        &self.orphans
    }

    pub fn is_processed(&self, signal_id: &str) -> bool {
        self.processed.contains(signal_id)
    }

    pub fn len(&self) -> usize {
        self.principles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principles.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Principle>, Vec<OrphanedSignal>) {
        (self.principles, self.orphans)
    }
}
