//! Ask command - one-shot question.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::json;

use carrivo_domain::LanguageHint;

use super::{Context, print_reply, spinner};
use crate::app;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to send
    #[arg(required = true)]
    pub prompt: String,

    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Reply language: auto, ar, ar_eg or en
    #[arg(short, long, default_value = "auto")]
    pub language: LanguageHint,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let services = app::build_services(ctx.settings())?;
    let session_id = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let dim = Style::new().dim();

    if ctx.verbose && !ctx.json_output {
        println!("{}", dim.apply_to(format!("Session: {}", session_id)));
        println!();
    }

    let progress = spinner(ctx, "Thinking...");
    let result = services
        .chat()
        .process_message(&session_id, &args.prompt, args.language)
        .await;
    progress.finish_and_clear();

    match result {
        Ok(response) => {
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_reply(&response, ctx.verbose);
            }
            Ok(())
        }
        Err(e) => {
            if let Some(apology) = e.apology() {
                if ctx.json_output {
                    let body = json!({
                        "session_id": session_id,
                        "response_text": apology,
                        "error": e.to_string(),
                        "degradations": e.degradations(),
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                } else {
                    println!("{}", apology);
                    if ctx.verbose {
                        for event in e.degradations() {
                            eprintln!("{}", super::describe_degradation(event));
                        }
                    }
                }
            }
            let red = Style::new().red();
            eprintln!("{} {}", red.apply_to("Error:"), e);
            Err(e.into())
        }
    }
}
