//! Soulcraft: synthesize a soul from identity signals
//!
//! Usage:
//!   soulcraft synthesize --workspace ~/.soulcraft --signals ./signals.json
//!   soulcraft status --workspace ~/.soulcraft
//!   soulcraft dump-config

use anyhow::Context;
use clap::{Parser, Subcommand};
use soulcraft_core::SignalInput;
use soulcraft_llm::AnthropicProvider;
use soulcraft_synthesis::persistence::{LockStatus, SoulStore};
use soulcraft_synthesis::{SynthesisConfig, SynthesisOptions, Synthesizer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soulcraft", about = "Incremental soul synthesis", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fold a batch of signals into the workspace soul.
    Synthesize {
        /// Workspace root (state lives in <workspace>/.soul)
        #[arg(long, default_value = "~/.soulcraft")]
        workspace: String,

        /// JSON array of signals
        #[arg(long)]
        signals: String,

        /// Rebuild from every known signal regardless of the cycle decision
        #[arg(long)]
        force: bool,

        /// Run every stage but write nothing
        #[arg(long)]
        dry_run: bool,

        /// The dimension hierarchy changed since the last run
        #[arg(long)]
        hierarchy_changed: bool,

        /// Path to config file (TOML). Default: <workspace>/soulcraft.toml
        #[arg(long)]
        config: Option<String>,

        /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,

        /// Model used for matching, classification and tension checks
        #[arg(long)]
        model: Option<String>,
    },
    /// Show the persisted soul and lock holder.
    Status {
        #[arg(long, default_value = "~/.soulcraft")]
        workspace: String,
    },
    /// Print the default config as TOML.
    DumpConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soulcraft=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::DumpConfig => {
            println!("{}", SynthesisConfig::default().to_toml());
        }
        Command::Status { workspace } => status(expand_tilde(&workspace)),
        Command::Synthesize {
            workspace,
            signals,
            force,
            dry_run,
            hierarchy_changed,
            config,
            api_key,
            model,
        } => {
            let workspace = expand_tilde(&workspace);
            let config_path = config
                .map(|p| expand_tilde(&p))
                .unwrap_or_else(|| workspace.join("soulcraft.toml"));
            let config = SynthesisConfig::load(&config_path);

            let signals_path = expand_tilde(&signals);
            let raw = std::fs::read_to_string(&signals_path)
                .with_context(|| format!("reading {}", signals_path.display()))?;
            let inputs: Vec<SignalInput> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", signals_path.display()))?;

            let api_key = api_key
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY not set. Pass --api-key or set the env var."))?;
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(model) = model {
                provider = provider.with_model(model);
            }

            let synthesizer = Synthesizer::new(&workspace, Arc::new(provider), config);
            let report = synthesizer
                .run(
                    &inputs,
                    SynthesisOptions {
                        force,
                        dry_run,
                        hierarchy_changed,
                    },
                )
                .await?;

            for line in report.summary() {
                println!("{}", line);
            }
            for axiom in &report.soul.axioms {
                let marker = if axiom.promotable { " " } else { "!" };
                println!(
                    "{} {:<8} n={:<3} {}",
                    marker,
                    format!("{:?}", axiom.tier).to_lowercase(),
                    axiom.n_count,
                    axiom.canonical.notated
                );
            }
        }
    }

    Ok(())
}

fn status(workspace: PathBuf) {
    let store = SoulStore::new(&workspace);
    match store.load_soul() {
        Some(soul) => {
            println!("soul {} cycle {} (updated {})", soul.id, soul.cycle_count, soul.updated_at);
            println!("principles: {}, axioms: {}", soul.principles.len(), soul.axioms.len());
            if let Some(cycle) = &soul.last_cycle {
                println!(
                    "last cycle: {} (new evidence {:.0}%, {} contradictions)",
                    cycle.mode,
                    cycle.new_evidence_ratio * 100.0,
                    cycle.contradiction_count
                );
            }
        }
        None => println!("no soul at {}", store.dir().display()),
    }
    match store.lock_status() {
        LockStatus::Free => println!("lock: free"),
        LockStatus::Held { pid, alive, .. } => println!(
            "lock: held by pid {} ({}) at {}",
            pid,
            if alive { "running" } else { "gone" },
            store.lock_path().display()
        ),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
