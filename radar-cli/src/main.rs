//! Radar CLI
//!
//! Discovers trade businesses from pages, registry numbers and free text,
//! deduplicates them into profiles, scores them and assigns outreach rings.

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use radar_core::{audit_trail, CandidateRecord, PipelineRun, Profile, ProfileStats, RawInput, Ring};
use radar_engine::{
    create_backend, LlmProvider, LlmSignalProvider, LogDispatcher, RegistryEnricher,
    RingClassifier, RuleSignalProvider, ScoringEngine, SharedDispatcher, SharedProvider,
    WebhookDispatcher,
};
use radar_runtime::{InMemoryProfileStore, Pipeline};
use radar_sources::{CompositeFetcher, HttpFetcher, RegistryClient, SharedFetcher};

use crate::config::RadarConfig;

#[derive(Parser)]
#[command(name = "radar")]
#[command(author, version, about = "Radar: lead discovery and ring classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of source references through the pipeline
    Run {
        /// File with one reference per line: https://..., url:, registry: or text:
        #[arg(short, long)]
        input: PathBuf,

        /// Write the run outcome and profiles as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Signal provider: openai, anthropic or none (rules only)
        #[arg(long)]
        llm: Option<LlmProvider>,

        /// Classify without dispatching outreach
        #[arg(long)]
        no_outreach: bool,

        /// Items processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_key: Option<String>,

        /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        anthropic_key: Option<String>,

        /// Registry API key (or set REGISTRY_API_KEY env var)
        #[arg(long, env = "REGISTRY_API_KEY", hide_env_values = true)]
        registry_key: Option<String>,

        /// Outreach webhook URL (or set RADAR_WEBHOOK_URL env var)
        #[arg(long, env = "RADAR_WEBHOOK_URL")]
        webhook: Option<String>,
    },

    /// Normalize, score and classify a piece of free text
    Classify {
        /// Description of the business or person
        #[arg(short, long)]
        text: String,
    },

    /// Show the rings and their outreach hooks
    Rings,

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = RadarConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            output,
            llm,
            no_outreach,
            workers,
            openai_key,
            anthropic_key,
            registry_key,
            webhook,
        } => {
            if let Some(provider) = llm {
                config.llm.provider = provider;
            }
            config.llm.api_key = match config.llm.provider {
                LlmProvider::OpenAI => openai_key,
                LlmProvider::Anthropic => anthropic_key,
                LlmProvider::None => None,
            };
            if registry_key.is_some() {
                config.registry.api_key = registry_key;
            }
            if let Some(url) = webhook {
                config.webhook.url = url;
            }
            if let Some(workers) = workers {
                config.pipeline.max_workers = workers;
            }
            if no_outreach {
                config.pipeline.dispatch_outreach = false;
            }
            run_batch(&config, &input, output).await?;
        }
        Commands::Classify { text } => {
            classify_text(&config, &text)?;
        }
        Commands::Rings => {
            print_rings();
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Reference lines of an input file; blanks and `#` comments are skipped
fn parse_refs(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[derive(Serialize)]
struct RunReport<'a> {
    run: &'a PipelineRun,
    stats: ProfileStats,
    profiles: Vec<Profile>,
}

async fn run_batch(config: &RadarConfig, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let contents = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let refs = parse_refs(&contents);
    if refs.is_empty() {
        anyhow::bail!("no source references in {}", input.display());
    }

    println!("📡 Radar - lead discovery\n");
    println!("📥 {} references from {}", refs.len(), input.display());

    let web: SharedFetcher = Arc::new(HttpFetcher::new(config.http.clone())?);
    let registry: SharedFetcher = Arc::new(RegistryClient::new(config.registry.clone())?);
    let fetcher = CompositeFetcher::new()
        .with_web(web)
        .with_registry(registry.clone());

    let provider: SharedProvider = match create_backend(&config.llm)? {
        Some(backend) => {
            println!("🤖 Signals: LLM ({}) with rule fallback", backend.model_name());
            Arc::new(LlmSignalProvider::new(backend))
        }
        None => {
            println!("🤖 Signals: rules");
            Arc::new(RuleSignalProvider::new())
        }
    };

    let dispatcher: SharedDispatcher = if config.webhook.url.is_empty() {
        Arc::new(LogDispatcher)
    } else {
        Arc::new(WebhookDispatcher::new(&config.webhook)?)
    };
    let outreach = if config.pipeline.dispatch_outreach {
        dispatcher.name().to_string()
    } else {
        "disabled".to_string()
    };
    println!(
        "⚙️  Workers: {} | Attempts: {} | Outreach: {}\n",
        config.pipeline.max_workers, config.pipeline.max_attempts, outreach
    );

    let store = Arc::new(InMemoryProfileStore::new());
    let pipeline = Pipeline::new(
        config.pipeline.clone(),
        config.stages(),
        Arc::new(fetcher),
        store.clone(),
    )?
    .with_provider(provider)
    .with_enricher(Arc::new(RegistryEnricher::new(registry)))
    .with_dispatcher(dispatcher);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight stages");
            interrupt.cancel();
        }
    });

    let run = pipeline.run_with_cancel(&refs, &cancel).await;

    println!("\n{}", "=".repeat(60));
    for item in &run.items {
        let detail = item.error.as_deref().unwrap_or_default();
        println!("  {:<48} {} {}", item.input_ref, item.status, detail);
    }
    println!("{}", "=".repeat(60));
    println!("📊 {}", run.summary());
    if run.cancelled {
        println!("⚠️  Run was cancelled");
    }

    let stats = store.stats();
    for ring in Ring::ALL {
        let count = stats.by_ring.get(&ring.number()).copied().unwrap_or_default();
        println!("   {:<28} {}", ring.to_string(), count);
    }
    if let Some(avg) = stats.average_quality_score {
        println!("   Average quality score: {:.1}", avg);
    }

    if let Some(path) = output {
        let report = RunReport {
            run: &run,
            stats,
            profiles: store.list(),
        };
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\n📄 Results saved to: {}", path.display());
    }

    Ok(())
}

fn classify_text(config: &RadarConfig, text: &str) -> Result<()> {
    let normalizer = radar_core::Normalizer::new(config.normalizer.clone())?;
    let record: CandidateRecord = normalizer.normalize(&RawInput::manual(text))?;
    let derived = RuleSignalProvider::new().extract_sync(text).unwrap_or_default();
    let record = record.supersede(derived);
    let profile = Profile::seed(&record);

    println!("📝 Extracted attributes:");
    for (name, value) in profile.attribute_values() {
        println!("   {:<20} {}", name, value);
    }

    let score = match ScoringEngine::new(&config.scoring).score(&profile, Utc::now()) {
        Ok(score) => score,
        Err(e) => {
            println!("\n⚠️  Cannot score: {}", e);
            return Ok(());
        }
    };
    let classification = RingClassifier::new(config.classifier.clone()).classify(&profile, &score);

    println!("\n🎯 {}", classification.ring);
    println!("   Quality score: {:.1}", score.quality_score);
    println!("   Confidence:    {:.2}", classification.confidence);
    println!("   Rationale:     {}", classification.rationale);
    if !score.gaps.is_empty() {
        let gaps: Vec<String> = score
            .gaps
            .iter()
            .map(|gap| format!("{} ({})", gap.signal, gap.reason))
            .collect();
        println!("   Missing:       {}", gaps.join("; "));
    }
    println!("   Signals:       {}", audit_trail(&score.signals));

    Ok(())
}

fn print_rings() {
    for ring in Ring::ALL {
        println!("{}", ring);
        println!("   {}", ring.description());
        for hook in ring.hooks() {
            println!("   - {}", hook);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refs_skips_comments_and_blanks() {
        let refs = parse_refs(
            "# trades in Utrecht\nhttps://jansen.nl\n\n  registry:12345678  \ntext:ZZP timmerman\n",
        );
        assert_eq!(
            refs,
            vec!["https://jansen.nl", "registry:12345678", "text:ZZP timmerman"]
        );
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "radar", "-v", "2", "run", "--input", "refs.txt", "--llm", "none", "--no-outreach",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                llm, no_outreach, ..
            } => {
                assert_eq!(llm, Some(LlmProvider::None));
                assert!(no_outreach);
            }
            _ => panic!("expected run"),
        }
    }
}
