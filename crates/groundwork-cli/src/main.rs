//! `groundwork` command line.
//!
//! Offline commands (`ground`, `validate`, `report`) run the deterministic
//! core only. `extract` runs the whole pipeline against a provider picked by
//! `--provider` from the providers compiled in (feature `openai`). Output is
//! JSON on stdout; logs go to stderr (`RUST_LOG`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use groundwork_core::{
    ground_candidates, partition_valid, Fact, FactValidator, QualityReport, SourceDocument,
    ValidationContext,
};
use groundwork_runtime::providers::{LlmProvider, ProviderRegistry};
use groundwork_runtime::response::parse_candidates;
use groundwork_runtime::{FactPipeline, FactStore, LlmGenerator, MemoryFactStore, RuntimeConfig};

#[derive(Parser)]
#[command(name = "groundwork")]
#[command(about = "Ground summary facts in their source transcript")]
#[command(version)]
struct Cli {
    /// Runtime configuration (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground candidate assertions and validate the resulting facts
    Ground {
        #[arg(long)]
        transcript: PathBuf,

        /// Candidates as `{"facts": [{"text": ...}]}`
        #[arg(long)]
        candidates: PathBuf,

        #[arg(long, default_value = "local")]
        id: String,
    },

    /// Run the four validators over stored facts
    Validate {
        #[arg(long)]
        transcript: PathBuf,

        /// JSON array of facts
        #[arg(long)]
        facts: PathBuf,
    },

    /// Hallucination rate and citation coverage for a fact set
    Report {
        #[arg(long)]
        transcript: PathBuf,

        #[arg(long)]
        facts: PathBuf,
    },

    /// Extract, validate, verify and store facts with a live model
    Extract {
        #[arg(long)]
        transcript: PathBuf,

        #[arg(long)]
        summary: PathBuf,

        #[arg(long, default_value = "local")]
        id: String,

        /// Chat-completion provider type
        #[arg(long, default_value = "openai")]
        provider: String,

        /// Override the provider's API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// SQLite database URL, e.g. `sqlite://facts.db?mode=rwc`
        #[cfg(feature = "sqlite")]
        #[arg(long)]
        database: Option<String>,
    },
}

#[derive(Serialize)]
struct GroundOutput {
    facts: Vec<Fact>,
    discarded: Vec<groundwork_core::Discard>,
    rejected: Vec<groundwork_core::ValidationResult>,
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_facts(path: &Path) -> Result<Vec<Fact>> {
    serde_json::from_str(&read(path)?)
        .with_context(|| format!("{} is not a JSON fact array", path.display()))
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Invalid configuration in {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn ground(config: &RuntimeConfig, transcript: &Path, candidates: &Path, id: &str) -> Result<()> {
    let transcript = read(transcript)?;
    let candidates = parse_candidates(&read(candidates)?).context("Malformed candidate list")?;

    let outcome = ground_candidates(&candidates, id, &transcript, &config.facts);
    let ctx = ValidationContext::new(&transcript, &config.facts);
    let results =
        FactValidator::new().validate_facts(&outcome.facts, &ctx, config.validation_workers);
    let (facts, rejected) = partition_valid(outcome.facts, &results);

    tracing::info!(
        accepted = facts.len(),
        discarded = outcome.discarded.len(),
        rejected = rejected.len(),
        "Grounding complete"
    );
    output(&GroundOutput {
        facts,
        discarded: outcome.discarded,
        rejected,
    })
}

fn validate(config: &RuntimeConfig, transcript: &Path, facts: &Path) -> Result<()> {
    let transcript = read(transcript)?;
    let facts = read_facts(facts)?;

    let ctx = ValidationContext::new(&transcript, &config.facts);
    let results = FactValidator::new().validate_facts(&facts, &ctx, config.validation_workers);
    output(&results)
}

fn report(config: &RuntimeConfig, transcript: &Path, facts: &Path) -> Result<()> {
    let transcript = read(transcript)?;
    let facts = read_facts(facts)?;

    let ctx = ValidationContext::new(&transcript, &config.facts);
    let report = QualityReport::compute(&facts, &ctx);
    let hallucination_rate = report.hallucination_rate();
    let citation_coverage = report.citation_coverage();
    output(&json!({
        "report": report,
        "hallucination_rate": hallucination_rate,
        "citation_coverage": citation_coverage,
    }))
}

/// Provider settings handed to the registry's factory.
fn provider_settings(base_url: Option<&str>) -> serde_json::Value {
    match base_url {
        Some(url) => json!({ "base_url": url }),
        None => json!({}),
    }
}

fn build_provider(
    registry: &ProviderRegistry,
    provider: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmProvider>> {
    registry
        .create(provider, &provider_settings(base_url))
        .with_context(|| format!("Provider '{}' unavailable", provider))
}

async fn extract(
    config: RuntimeConfig,
    source: SourceDocument,
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn FactStore>,
) -> Result<()> {
    tracing::info!(provider = provider.name(), "Starting extraction");
    let generator = Arc::new(LlmGenerator::new(provider, config.generation.clone()));
    let pipeline = FactPipeline::new(generator, store, &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let report = pipeline.process(&source, &cancel).await?;
    let usage = pipeline.usage();
    tracing::info!(
        total_tokens = usage.total_tokens,
        calls = usage.calls,
        "Generation usage"
    );
    output(&report)
}

#[cfg(feature = "sqlite")]
async fn open_store(database: Option<&str>) -> Result<Arc<dyn FactStore>> {
    match database {
        Some(url) => Ok(Arc::new(
            groundwork_runtime::SqliteFactStore::new(url)
                .await
                .context("Failed to open fact database")?,
        )),
        None => Ok(Arc::new(MemoryFactStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ground {
            transcript,
            candidates,
            id,
        } => ground(&config, &transcript, &candidates, &id),
        Commands::Validate { transcript, facts } => validate(&config, &transcript, &facts),
        Commands::Report { transcript, facts } => report(&config, &transcript, &facts),
        Commands::Extract {
            transcript,
            summary,
            id,
            provider,
            base_url,
            #[cfg(feature = "sqlite")]
            database,
        } => {
            let source = SourceDocument::new(id, read(&transcript)?, read(&summary)?);
            let registry = ProviderRegistry::with_defaults();
            let provider = build_provider(&registry, &provider, base_url.as_deref())?;

            #[cfg(feature = "sqlite")]
            let store = open_store(database.as_deref()).await?;
            #[cfg(not(feature = "sqlite"))]
            let store: Arc<dyn FactStore> = Arc::new(MemoryFactStore::new());

            extract(config, source, provider, store).await
        }
    }
}
