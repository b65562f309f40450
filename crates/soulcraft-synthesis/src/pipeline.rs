//! Synthesizer: one full synthesis run over a workspace
//!
//! lock → load → classify → decide → cluster → compress → tensions → persist → unlock.
//! Nothing is written until every stage has succeeded; a dry run writes nothing.

use crate::classify::SignalClassifier;
use crate::compressor::{compress, CompressionResult};
use crate::config::SynthesisConfig;
use crate::cycle::{decide_cycle_mode, CycleDecision};
use crate::matcher::{LlmMatcher, Matcher};
use crate::persistence::SoulStore;
use crate::principle_store::{AddAction, PrincipleStore};
use crate::tension::{detect_and_attach, TensionDetector};
use soulcraft_core::{CycleMode, OrphanedSignal, Principle, Result, Signal, SignalInput, Soul};
use soulcraft_llm::{LlmProvider, RetryingProvider};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct SynthesisOptions {
    /// Always rebuild from every known signal.
    pub force: bool,
    /// Run every stage but persist nothing.
    pub dry_run: bool,
    /// The dimension hierarchy changed since the last run.
    pub hierarchy_changed: bool,
}

#[derive(Clone, Debug)]
pub struct SynthesisReport {
    pub soul: Soul,
    pub decision: CycleDecision,
    /// Signals in this batch not seen by any earlier run.
    pub new_signals: usize,
    /// Signals in this batch already folded into the soul (or repeated in the batch).
    pub skipped_signals: usize,
    pub created: usize,
    pub reinforced: usize,
    pub compression: CompressionResult,
    pub orphans: Vec<OrphanedSignal>,
    pub tensions: usize,
    pub persisted: bool,
}

impl SynthesisReport {
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("soul {} cycle {}", self.soul.id, self.soul.cycle_count),
            format!("mode: {}", self.decision.mode),
        ];
        for trigger in &self.decision.triggers {
            lines.push(format!("  trigger: {}", trigger));
        }
        lines.push(format!(
            "signals: {} new, {} skipped; principles: {} created, {} reinforced, {} total",
            self.new_signals,
            self.skipped_signals,
            self.created,
            self.reinforced,
            self.soul.principles.len()
        ));
        lines.push(format!(
            "axioms: {} kept ({} promotable), {} pruned, N>={}",
            self.compression.axioms.len(),
            self.compression.promotable_count(),
            self.compression.pruned.len(),
            self.compression.effective_threshold().unwrap_or(0)
        ));
        for guardrail in &self.compression.guardrails {
            lines.push(format!("  guardrail: {}", guardrail));
        }
        lines.push(format!("tensions: {}, orphaned signals: {}", self.tensions, self.orphans.len()));
        if !self.persisted {
            lines.push("dry run: nothing written".to_string());
        }
        lines
    }
}

pub struct Synthesizer {
    config: SynthesisConfig,
    store: SoulStore,
    matcher: Arc<dyn Matcher>,
    classifier: SignalClassifier,
    tensions: TensionDetector,
}

impl Synthesizer {
    /// Wire every stage to one provider, wrapped in the configured retry policy.
    pub fn new(workspace: &Path, provider: Arc<dyn LlmProvider>, config: SynthesisConfig) -> Self {
        let provider: Arc<dyn LlmProvider> = Arc::new(RetryingProvider::new(provider, config.retry_policy()));
        let matcher = Arc::new(
            LlmMatcher::new(provider.clone()).with_pairwise_concurrency(config.matching.pairwise_concurrency),
        );
        Self::with_matcher(workspace, provider, matcher, config)
    }

    /// Use a separate matcher (e.g. an index-backed one) alongside the provider.
    pub fn with_matcher(
        workspace: &Path,
        provider: Arc<dyn LlmProvider>,
        matcher: Arc<dyn Matcher>,
        config: SynthesisConfig,
    ) -> Self {
        let classifier = SignalClassifier::new(provider.clone())
            .with_limits(config.classify.max_attempts, config.classify.concurrency);
        let tensions = TensionDetector::new(provider).with_limits(config.tension.max_axioms, config.tension.concurrency);
        Self {
            config,
            store: SoulStore::new(workspace),
            matcher,
            classifier,
            tensions,
        }
    }

    pub fn store(&self) -> &SoulStore {
        &self.store
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn principle_store(&self, existing: Vec<Principle>) -> PrincipleStore {
        PrincipleStore::with_principles(self.matcher.clone(), self.config.matching.threshold, existing)
    }

    pub async fn run(&self, inputs: &[SignalInput], options: SynthesisOptions) -> Result<SynthesisReport> {
        let _lock = self.store.lock()?;

        let existing = self.store.load_soul();
        let processed = existing
            .as_ref()
            .map(Soul::processed_signal_ids)
            .unwrap_or_default();

        let signals = self.classifier.classify_all(inputs).await?;
        let mut batch_ids = HashSet::new();
        let new_signals: Vec<Signal> = signals
            .into_iter()
            .filter(|s| !processed.contains(&s.id) && batch_ids.insert(s.id.clone()))
            .collect();
        let skipped_signals = inputs.len() - new_signals.len();
        info!(
            "Synthesis: {} signals in batch, {} new, {} already processed",
            inputs.len(),
            new_signals.len(),
            skipped_signals
        );

        // Cluster the new signals alone so the decision sees them as principles.
        let incoming = if existing.is_some() && !options.force {
            let mut incoming = self.principle_store(Vec::new());
            incoming.add_signals(&new_signals).await?;
            incoming.into_parts().0
        } else {
            Vec::new()
        };

        let decision = decide_cycle_mode(
            existing.as_ref(),
            &incoming,
            &self.config.cycle,
            options.hierarchy_changed,
            options.force,
        );

        let (mut principle_store, to_ingest) = match decision.mode {
            CycleMode::Incremental => {
                let prior = existing.as_ref().map(|s| s.principles.clone()).unwrap_or_default();
                (self.principle_store(prior), new_signals.clone())
            }
            CycleMode::Initial | CycleMode::FullResynthesis => {
                let mut all = self.store.load_signals();
                let known: HashSet<String> = all.iter().map(|s| s.id.clone()).collect();
                let missing = processed.iter().filter(|id| !known.contains(*id)).count();
                if missing > 0 {
                    warn!(
                        "{} previously processed signals are missing from {}; they cannot be re-clustered",
                        missing,
                        self.store.signals_path().display()
                    );
                }
                all.extend(new_signals.iter().cloned());
                (self.principle_store(Vec::new()), all)
            }
        };

        let outcomes = principle_store.add_signals(&to_ingest).await?;
        let created = outcomes.iter().filter(|o| o.action == AddAction::Created).count();
        let reinforced = outcomes.iter().filter(|o| o.action == AddAction::Reinforced).count();

        let (principles, orphans) = principle_store.into_parts();
        if !orphans.is_empty() {
            warn!(
                "{} signals matched no principle at threshold {:.2} and seeded their own",
                orphans.len(),
                self.config.matching.threshold
            );
        }

        let signal_count: usize = principles.iter().map(|p| p.n_count as usize).sum();
        let mut compression = compress(&principles, signal_count, &self.config.promotion);
        let tensions = detect_and_attach(&self.tensions, &mut compression.axioms).await;

        let mut soul = Soul::succeed(existing.as_ref(), principles, compression.axioms.clone());
        soul.last_cycle = Some(decision.record());

        let persisted = if options.dry_run {
            info!("Dry run: skipping persistence");
            false
        } else {
            let stored = self.store.commit(&new_signals, &compression, &soul)?;
            info!(
                "Persisted soul {} (cycle {}, {} signals on record) to {}",
                soul.id,
                soul.cycle_count,
                stored,
                self.store.dir().display()
            );
            true
        };

        Ok(SynthesisReport {
            soul,
            decision,
            new_signals: new_signals.len(),
            skipped_signals,
            created,
            reinforced,
            compression,
            orphans,
            tensions,
            persisted,
        })
    }
}
