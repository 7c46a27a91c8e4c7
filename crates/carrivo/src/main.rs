//! Carrivo - bilingual career FAQ and roadmap assistant
//!
//! Main entry point for the Carrivo CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use carrivo_config::LoggingConfig;

mod app;
mod commands;

use commands::{ask, backfill, chat, config, roadmaps, search, seed};

const CRATES: &[&str] = &[
    "carrivo",
    "carrivo_config",
    "carrivo_domain",
    "carrivo_knowledge",
    "carrivo_llm",
    "carrivo_session",
];

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Carrivo - bilingual career FAQ and roadmap assistant
#[derive(Parser)]
#[command(name = "carrivo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Extra config file, applied over the discovered ones
    #[arg(short, long, global = true, env = "CARRIVO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Run retrieval only and show what would ground a reply
    Search(search::SearchArgs),

    /// Load roadmaps and FAQ entries into the local store
    Seed(seed::SeedArgs),

    /// Generate missing embeddings for stored items
    Backfill(backfill::BackfillArgs),

    /// Browse stored roadmaps
    Roadmaps(roadmaps::RoadmapsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

fn directives(level: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, level)).collect();
    parts.push("warn".to_string());
    parts.join(",")
}

/// Console layer on stderr plus an optional daily JSON file. The returned
/// guard must live until exit so buffered file lines are flushed.
fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let console_filter = || {
        if verbose {
            EnvFilter::new(directives("debug"))
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(directives(&logging.level)))
        }
    };

    let console_json = logging.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter())
    });
    let console_text = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(console_filter())
    });

    let mut guard = None;
    let file_layer = logging.directory.as_ref().and_then(|dir| {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&logging.file_prefix)
            .filename_suffix("log")
            .build(dir);
        match appender {
            Ok(appender) => {
                let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_filter(EnvFilter::new(directives("trace"))),
                )
            }
            Err(e) => {
                eprintln!("Log file disabled ({}): {}", dir.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .init();

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = carrivo_config::load_config_with_options(None, None, cli.config.as_deref())?;
    let _guard = init_tracing(&loaded.config.logging_or_default(), cli.verbose);

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Search(args) => search::run(args, &ctx).await,
        Commands::Seed(args) => seed::run(args, &ctx).await,
        Commands::Backfill(args) => backfill::run(args, &ctx).await,
        Commands::Roadmaps(args) => roadmaps::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
