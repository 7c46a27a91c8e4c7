//! CLI command handlers.

pub mod ask;
pub mod backfill;
pub mod chat;
pub mod config;
pub mod repl;
pub mod roadmaps;
pub mod search;
pub mod seed;

use std::time::Duration;

use carrivo_config::{CarrivoConfig, LoadedConfig};
use carrivo_domain::{ChatResponse, DegradationEvent};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Resolved configuration and where it came from.
    pub config: LoadedConfig,
}

impl Context {
    pub fn settings(&self) -> &CarrivoConfig {
        &self.config.config
    }
}

/// Spinner for long-running work; hidden in JSON mode.
pub(crate) fn spinner(ctx: &Context, message: &str) -> ProgressBar {
    if ctx.json_output {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// One-line description of a degradation for humans.
pub(crate) fn describe_degradation(event: &DegradationEvent) -> String {
    match event {
        DegradationEvent::EmbeddingUnavailable(reason) => {
            format!("embeddings unavailable: {}", reason)
        }
        DegradationEvent::RemoteIndexUnavailable(reason) => {
            format!("remote index unavailable: {}", reason)
        }
        DegradationEvent::ContextualizationFailed(reason) => {
            format!("follow-up rewrite skipped: {}", reason)
        }
        DegradationEvent::NoGrounding => "no matching knowledge, answered ungrounded".to_string(),
        DegradationEvent::PersistenceFailed(reason) => {
            format!("history not saved: {}", reason)
        }
    }
}

/// Print the reply, then sources and degradations when verbose.
pub(crate) fn print_reply(response: &ChatResponse, verbose: bool) {
    println!("{}", response.response_text);

    if !verbose {
        return;
    }
    let dim = Style::new().dim();
    println!();
    println!(
        "{}",
        dim.apply_to(format!(
            "[{} → {} | intent: {} | confidence: {:.2} | tier: {}]",
            response.detected_language,
            response.response_language,
            response.intent.as_str(),
            response.confidence,
            response
                .tier
                .map(|t| t.as_str())
                .unwrap_or("none")
        ))
    );
    if response.contextualized {
        println!("{}", dim.apply_to(format!("[query: {}]", response.query)));
    }
    for source in &response.retrieved_sources {
        println!(
            "{}",
            dim.apply_to(format!("  · {} ({:.3})", source.title, source.score))
        );
    }
    for event in &response.degradations {
        println!(
            "{}",
            Style::new().yellow().apply_to(format!("  ⚠ {}", describe_degradation(event)))
        );
    }
}
