//! Signal classification: fills in dimension, stance and importance
//!
//! Each missing attribute is asked for concurrently. An answer outside the
//! closed label set triggers a corrective re-ask; after `max_attempts` the
//! conservative default is used. Provider failures are not retried here
//! (the provider's retry layer owns that) and abort classification.

use futures::stream::{self, StreamExt, TryStreamExt};
use soulcraft_core::{
    ArtifactProvenance, Result, Signal, SignalImportance, SignalInput, SignalStance, SoulDimension,
};
use soulcraft_llm::LlmProvider;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SignalClassifier {
    provider: Arc<dyn LlmProvider>,
    max_attempts: u32,
    concurrency: usize,
}

fn dimension_prompt(text: &str) -> String {
    format!(
        "Which identity dimension does this statement primarily speak to?\n\n\"{}\"\n\n\
         identity-core: who the agent fundamentally is\n\
         character-traits: stable dispositions and temperament\n\
         voice-presence: how it sounds and shows up\n\
         honesty-framework: truthfulness and candor\n\
         boundaries-ethics: limits and moral commitments\n\
         relationship-dynamics: how it relates to others\n\
         continuity-growth: memory, change and learning",
        text
    )
}

fn stance_prompt(text: &str) -> String {
    format!(
        "What rhetorical stance does this statement take toward its claim?\n\n\"{}\"\n\n\
         assert: states it as true\n\
         deny: rejects it\n\
         question: doubts or probes it\n\
         qualify: accepts it with conditions\n\
         tensioning: holds it against a competing value",
        text
    )
}

fn importance_prompt(text: &str) -> String {
    format!(
        "How central is this statement to the identity it describes?\n\n\"{}\"\n\n\
         core: defining, would change who the agent is if removed\n\
         supporting: reinforces a core value\n\
         peripheral: incidental or situational",
        text
    )
}

fn corrective_prompt(original: &str, labels: &[&str]) -> String {
    format!(
        "{}\n\nYour previous answer was not one of the allowed labels. \
         Answer with exactly one of: {}.",
        original,
        labels.join(", ")
    )
}

impl SignalClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_attempts: 3,
            concurrency: 10,
        }
    }

    pub fn with_limits(mut self, max_attempts: u32, concurrency: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Ask for one attribute until the answer parses into `T`.
    async fn ask<T>(&self, attribute: &str, prompt: String, labels: &[&str], default: T) -> Result<T>
    where
        T: FromStr + Copy + std::fmt::Debug,
    {
        let mut current = prompt.clone();
        for attempt in 1..=self.max_attempts {
            let answer = self.provider.classify(&current, labels).await?;
            if let Some(value) = answer.category.as_deref().and_then(|c| T::from_str(c).ok()) {
                return Ok(value);
            }
            debug!("Unrecognized {} answer (attempt {}/{})", attribute, attempt, self.max_attempts);
            current = corrective_prompt(&prompt, labels);
        }
        warn!(
            "No valid {} after {} attempts, defaulting to {:?}",
            attribute, self.max_attempts, default
        );
        Ok(default)
    }

    /// Classify one signal. Attributes already present are kept as-is.
    pub async fn classify(&self, input: &SignalInput) -> Result<Signal> {
        if let Some(signal) = input.as_classified() {
            return Ok(signal);
        }

        let dimension_labels = SoulDimension::labels();
        let stance_labels = SignalStance::labels();
        let importance_labels = SignalImportance::labels();

        let (dimension, stance, importance) = tokio::join!(
            async {
                match input.dimension {
                    Some(d) => Ok(d),
                    None => {
                        self.ask(
                            "dimension",
                            dimension_prompt(&input.text),
                            &dimension_labels,
                            SoulDimension::IdentityCore,
                        )
                        .await
                    }
                }
            },
            async {
                match input.stance {
                    Some(s) => Ok(s),
                    None => {
                        self.ask("stance", stance_prompt(&input.text), &stance_labels, SignalStance::Assert)
                            .await
                    }
                }
            },
            async {
                match input.importance {
                    Some(i) => Ok(i),
                    None => {
                        self.ask(
                            "importance",
                            importance_prompt(&input.text),
                            &importance_labels,
                            SignalImportance::Supporting,
                        )
                        .await
                    }
                }
            },
        );

        Ok(Signal {
            id: input.id.clone(),
            text: input.text.clone(),
            confidence: input.confidence.clamp(0.0, 1.0),
            dimension: dimension?,
            importance: importance?,
            stance: stance?,
            provenance: input.provenance.unwrap_or(ArtifactProvenance::SelfAuthored),
            source: input.source.clone(),
        })
    }

    /// Classify in bounded batches, preserving input order.
    pub async fn classify_all(&self, inputs: &[SignalInput]) -> Result<Vec<Signal>> {
        stream::iter(inputs)
            .map(|input| self.classify(input))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}
