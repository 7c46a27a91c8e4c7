//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use carrivo_domain::LanguageHint;

use super::Context;
use super::repl::Repl;
use crate::app;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Resume an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Force start a new session
    #[arg(short, long)]
    pub new: bool,

    /// Reply language: auto, ar, ar_eg or en
    #[arg(short, long, default_value = "auto")]
    pub language: LanguageHint,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let services = app::build_services(ctx.settings())?;

    let session_id = if args.new { None } else { args.session };

    let mut repl = Repl::new(services, session_id, args.language, ctx.verbose)?;
    repl.run().await
}
