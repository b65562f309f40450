//! Soulcraft synthesis: incremental clustering of identity signals into axioms
//!
//! Pipeline:
//! - Classify: fill in dimension / stance / importance for raw signals
//! - Cluster: route each signal onto a principle via the semantic matcher
//! - Decide: merge into the existing soul or rebuild it from all signals
//! - Compress: cascade, anti-echo-chamber gate, cognitive-load cap
//! - Tensions: pairwise conflicts between kept axioms
//! - Persist: atomic per-stage JSON under `<workspace>/.soul/`, single-writer lock

pub mod classify;
pub mod compressor;
pub mod config;
pub mod cycle;
pub mod matcher;
pub mod persistence;
pub mod pipeline;
pub mod principle_store;
pub mod tension;

pub use compressor::{CompressionResult, Guardrail};
pub use config::SynthesisConfig;
pub use cycle::{decide_cycle_mode, CycleDecision};
pub use matcher::{LlmMatcher, MatchResult, Matcher};
pub use persistence::{LockStatus, SoulStore, SynthesisLock};
pub use pipeline::{SynthesisOptions, SynthesisReport, Synthesizer};
pub use principle_store::{AddAction, AddOutcome, PrincipleStore};
pub use tension::TensionDetector;
