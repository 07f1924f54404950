//! Lifeline CLI - answers distressed posts on the filtered stream.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use lifeline::analysis::{LexiconClassifier, SentimentClassifier};
use lifeline::{Bot, BotConfig, Credentials};

/// Lifeline - filtered-stream support bot.
#[derive(Parser)]
#[command(name = "lifeline")]
#[command(about = "Replies to distressed posts with crisis-hotline information")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long, global = true, env = "LIFELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log file location
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize rules, then stream and reply until interrupted (default)
    Run,

    /// Replace the remote rules with the configured ones and exit
    SyncRules,

    /// Show the rules currently installed at the provider
    Rules,

    /// Score a piece of text with the built-in classifier
    Classify {
        /// Text to classify
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        BotConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(log_file) = cli.log_file {
        config.log_file = log_file;
    }

    let _guard = lifeline::logging::init(&config.log_file, cli.verbose)?;

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::SyncRules => sync_rules(config).await,
        Commands::Rules => list_rules(config).await,
        Commands::Classify { text } => classify(&config, &text).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Fatal error");
    }
    result
}

async fn run(config: BotConfig) -> Result<()> {
    let credentials = Credentials::from_env()?;
    tracing::info!(
        rules = config.rules.len(),
        capacity = config.queue_capacity,
        "Starting lifeline"
    );

    let bot = Bot::new(config, credentials)?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, shutting down");
            signal_cancel.cancel();
        }
    });

    let summary = bot.run(cancel).await?;
    tracing::info!(
        deleted_rules = summary.sync.deleted,
        connections = summary.reader.connections,
        events = summary.reader.events,
        replied = summary.processor.replied,
        discarded = summary.processor.discarded,
        "Shutdown complete"
    );
    Ok(())
}

async fn sync_rules(config: BotConfig) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let bot = Bot::new(config, credentials)?;
    let report = bot.sync_rules().await?;

    println!("Deleted: {}", report.deleted);
    println!("Added: {}", report.added);
    Ok(())
}

async fn list_rules(config: BotConfig) -> Result<()> {
    let credentials = Credentials::from_env()?;
    let bot = Bot::new(config, credentials)?;
    let rules = bot.list_rules().await?;

    if rules.is_empty() {
        println!("No rules installed.");
        return Ok(());
    }

    for rule in &rules {
        println!("{} [{}] {}", rule.id, rule.tag, rule.value);
    }
    println!("Total: {} rules", rules.len());
    Ok(())
}

async fn classify(config: &BotConfig, text: &str) -> Result<()> {
    let classifier = LexiconClassifier::new(config.negative_threshold);
    let polarity = classifier.polarity(text);
    let verdict = classifier.classify(text).await?;

    println!("Polarity: {polarity:.3}");
    println!("Verdict: {verdict:?}");
    Ok(())
}
