//! elenchus CLI: adversarial debate fact-checker.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use elenchus::batch::BatchDriver;
use elenchus::config::{AttackMode, ConfigError, DebateConfig};
use elenchus::error::ElenchusError;
use elenchus::llm::{DashScopeClient, DashScopeConfig};
use elenchus::orchestrator::Orchestrator;
use elenchus::search::{JinaClient, JinaConfig};

#[derive(Parser)]
#[command(name = "elenchus", version, about = "Adversarial debate fact-checker")]
struct Cli {
    /// Single claim to verify.
    #[arg(long, conflicts_with = "dataset")]
    claim: Option<String>,

    /// Dataset JSON path (batch mode).
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Output directory for batch artifacts.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Cap on dataset claims processed.
    #[arg(long)]
    max_samples: Option<usize>,

    /// First dataset index to process.
    #[arg(long)]
    start_index: Option<usize>,

    /// Number of debate rounds.
    #[arg(long)]
    rounds: Option<u32>,

    /// Attack validation mode: "strict" or "relaxed".
    #[arg(long)]
    attack_mode: Option<String>,

    /// TOML config file; CLI flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// LLM API key (falls back to $DASHSCOPE_API_KEY).
    #[arg(long)]
    llm_api_key: Option<String>,

    /// Search API key (falls back to $JINA_API_KEY).
    #[arg(long)]
    search_api_key: Option<String>,

    /// LLM model name.
    #[arg(long, default_value = "qwen-plus")]
    model: String,
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ureq=warn")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = match &e {
                ElenchusError::Config(_) => 2,
                ElenchusError::ExternalUnavailable => 3,
                _ => 1,
            };
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), ElenchusError> {
    let mut config = match &cli.config {
        Some(path) => DebateConfig::from_toml_file(path)?,
        None => DebateConfig::default(),
    };

    // CLI flags override file values.
    if let Some(rounds) = cli.rounds {
        config.max_rounds = rounds;
    }
    if let Some(mode) = &cli.attack_mode {
        config.attack_mode = AttackMode::parse(mode)?;
    }
    if cli.dataset.is_some() {
        config.dataset_path = cli.dataset.clone();
    }
    if cli.output.is_some() {
        config.output_dir = cli.output.clone();
    }
    if cli.max_samples.is_some() {
        config.max_samples = cli.max_samples;
    }
    if let Some(start) = cli.start_index {
        config.start_index = start;
    }
    config.validate()?;

    let llm = Arc::new(DashScopeClient::new(DashScopeConfig {
        api_key: cli
            .llm_api_key
            .clone()
            .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
            .unwrap_or_default(),
        model: cli.model.clone(),
        timeout: config.llm_timeout(),
        max_retries: config.max_retries,
        ..Default::default()
    }));
    let search = Arc::new(JinaClient::new(JinaConfig {
        api_key: cli
            .search_api_key
            .clone()
            .or_else(|| std::env::var("JINA_API_KEY").ok())
            .unwrap_or_default(),
        max_results: config.search_top_k,
        timeout: config.search_timeout(),
        max_retries: config.max_retries,
        ..Default::default()
    }));

    let orchestrator = Orchestrator::new(config.clone(), llm, search);

    match (&cli.claim, &config.dataset_path) {
        (Some(claim), _) => {
            let outcome = orchestrator.check_claim(claim)?;
            match serde_json::to_string_pretty(&outcome) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("could not serialize outcome: {e}"),
            }
            Ok(())
        }
        (None, Some(_)) => {
            let stats = BatchDriver::new(orchestrator)?.run()?;
            println!(
                "processed {} claims: {}/{} correct ({:.1}%), {} failed",
                stats.processed,
                stats.correct,
                stats.total,
                stats.accuracy * 100.0,
                stats.failed,
            );
            Ok(())
        }
        (None, None) => Err(ConfigError::InvalidOption {
            option: "claim".into(),
            message: "provide --claim <text> or --dataset <path>".into(),
        }
        .into()),
    }
}
