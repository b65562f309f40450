//! Tension detection between axioms
//!
//! Every unordered pair is put to the generator in fixed-size batches.
//! Anything other than a recognised negative answer is kept verbatim as the
//! tension description.

use futures::future::join_all;
use soulcraft_core::{Axiom, AxiomTension, AxiomTier, TensionSeverity};
use soulcraft_llm::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NEGATIVE_PREFIXES: [&str; 4] = ["no tension", "no conflict", "compatible", "aligned"];

/// A detected conflict between two axioms.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedTension {
    pub first: String,
    pub second: String,
    pub description: String,
    pub severity: TensionSeverity,
}

pub struct TensionDetector {
    provider: Arc<dyn LlmProvider>,
    max_axioms: usize,
    concurrency: usize,
}

/// Whether a generator answer means "no tension".
pub fn is_negative(response: &str) -> bool {
    let normalized = response.trim().to_lowercase();
    let first_word = normalized
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .unwrap_or("");
    if normalized.is_empty() || first_word == "no" || first_word == "none" {
        return true;
    }
    NEGATIVE_PREFIXES.iter().any(|p| normalized.starts_with(p))
}

pub fn severity_for(a: &Axiom, b: &Axiom) -> TensionSeverity {
    if a.dimension == b.dimension {
        TensionSeverity::High
    } else if a.tier == AxiomTier::Core && b.tier == AxiomTier::Core {
        TensionSeverity::Medium
    } else {
        TensionSeverity::Low
    }
}

fn tension_prompt(a: &Axiom, b: &Axiom) -> String {
    format!(
        "Two identity statements:\n\nA: {}\nB: {}\n\n\
         Do they pull against each other? If they are compatible, answer `no tension`. \
         Otherwise describe the conflict in one sentence.",
        a.canonical.notated, b.canonical.notated
    )
}

impl TensionDetector {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_axioms: 25,
            concurrency: 5,
        }
    }

    pub fn with_limits(mut self, max_axioms: usize, concurrency: usize) -> Self {
        self.max_axioms = max_axioms;
        self.concurrency = concurrency.max(1);
        self
    }

    /// Evaluate every unordered pair. Pairs whose call fails are logged and skipped.
    pub async fn detect(&self, axioms: &[Axiom]) -> Vec<DetectedTension> {
        if axioms.len() > self.max_axioms {
            warn!(
                "Skipping tension detection: {} axioms exceeds limit {}",
                axioms.len(),
                self.max_axioms
            );
            return Vec::new();
        }

        let pairs: Vec<(usize, usize)> = (0..axioms.len())
            .flat_map(|i| (i + 1..axioms.len()).map(move |j| (i, j)))
            .collect();
        debug!("Evaluating {} axiom pairs for tension", pairs.len());

        let mut found = Vec::new();
        for batch in pairs.chunks(self.concurrency) {
            let results = join_all(batch.iter().map(|&(i, j)| {
                let prompt = tension_prompt(&axioms[i], &axioms[j]);
                let provider = self.provider.clone();
                async move { (i, j, provider.generate(&prompt).await) }
            }))
            .await;

            for (i, j, result) in results {
                let (a, b) = (&axioms[i], &axioms[j]);
                match result {
                    Ok(response) if is_negative(&response) => {}
                    Ok(response) => found.push(DetectedTension {
                        first: a.id.clone(),
                        second: b.id.clone(),
                        description: response.trim().to_string(),
                        severity: severity_for(a, b),
                    }),
                    Err(e) => warn!("Tension check {} / {} failed: {}", a.id, b.id, e),
                }
            }
        }

        info!("Tension detection found {} tensions among {} axioms", found.len(), axioms.len());
        found
    }
}

/// Attach tensions to both sides. Re-attaching the same tensions changes nothing.
pub fn attach_tensions(axioms: &mut [Axiom], tensions: &[DetectedTension]) {
    let position: HashMap<String, usize> = axioms
        .iter()
        .enumerate()
        .map(|(i, a)| (a.id.clone(), i))
        .collect();

    for t in tensions {
        let (Some(&i), Some(&j)) = (position.get(&t.first), position.get(&t.second)) else {
            continue;
        };
        axioms[i].merge_tensions([AxiomTension {
            axiom_id: t.second.clone(),
            description: t.description.clone(),
            severity: t.severity,
        }]);
        axioms[j].merge_tensions([AxiomTension {
            axiom_id: t.first.clone(),
            description: t.description.clone(),
            severity: t.severity,
        }]);
    }
}

/// Detect and attach in one step.
pub async fn detect_and_attach(detector: &TensionDetector, axioms: &mut [Axiom]) -> usize {
    let tensions = detector.detect(axioms).await;
    attach_tensions(axioms, &tensions);
    tensions.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_answers() {
        assert!(is_negative("No tension."));
        assert!(is_negative("none"));
        assert!(is_negative("No, they agree"));
        assert!(is_negative("Compatible: both value care"));
        assert!(is_negative("aligned"));
        assert!(is_negative("no conflict here"));
    }

    #[test]
    fn anything_else_is_a_tension() {
        assert!(!is_negative("Honesty may conflict with kindness"));
        assert!(!is_negative("Nobody would hold both at once"));
        assert!(!is_negative("Yes, they conflict"));
    }
}
