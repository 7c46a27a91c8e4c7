//! Seed command - load roadmaps and FAQ entries into the local store.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use serde_json::json;

use carrivo_domain::backfill_embeddings;
use carrivo_knowledge::{Collection, SeedData, seed_store};

use super::{Context, spinner};
use crate::app;

/// Arguments for the seed command.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// JSON seed file (default: knowledge.seed_file, then the built-in set)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Insert items without generating embeddings
    #[arg(long)]
    pub no_embed: bool,
}

/// Run the seed command.
pub async fn run(args: SeedArgs, ctx: &Context) -> Result<()> {
    let config = ctx.settings();
    let seed_file = args.file.or_else(|| config.knowledge_or_default().seed_file);
    let data = match seed_file {
        Some(ref path) => SeedData::from_file(path)
            .with_context(|| format!("Failed to load seed file {}", path.display()))?,
        None => SeedData::builtin(),
    };

    let store = app::open_store(config)?;
    let report = seed_store(&store, &data)?;

    let mut embedded = 0;
    let mut embed_error = None;
    if !args.no_embed {
        match app::build_embeddings(config) {
            Ok(pool) => {
                let progress = spinner(ctx, "Embedding new items...");
                for collection in Collection::ALL {
                    let backfill = backfill_embeddings(&store, &pool, collection, false).await;
                    match backfill {
                        Ok(backfill) => embedded += backfill.embedded,
                        Err(e) => {
                            embed_error = Some(e.to_string());
                            break;
                        }
                    }
                }
                progress.finish_and_clear();
            }
            Err(e) => embed_error = Some(format!("{:#}", e)),
        }
    }

    if ctx.json_output {
        let body = json!({
            "source": seed_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "builtin".to_string()),
            "roadmaps_inserted": report.roadmaps_inserted,
            "faqs_inserted": report.faqs_inserted,
            "skipped": report.skipped,
            "embedded": embedded,
            "embedding_error": embed_error,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    println!(
        "{} Seeded {} roadmap(s) and {} FAQ entr{}",
        green.apply_to("✓"),
        report.roadmaps_inserted,
        report.faqs_inserted,
        if report.faqs_inserted == 1 { "y" } else { "ies" }
    );
    if report.skipped > 0 {
        println!("{}", dim.apply_to(format!("  {} already present", report.skipped)));
    }
    if args.no_embed {
        println!("{}", dim.apply_to("  Embeddings skipped; run 'carrivo backfill' later."));
    } else if let Some(error) = embed_error {
        let yellow = Style::new().yellow();
        println!("{} Embeddings not generated: {}", yellow.apply_to("⚠"), error);
        println!("{}", dim.apply_to("  Lexical search still works. Run 'carrivo backfill' once embeddings are available."));
    } else {
        println!("{}", dim.apply_to(format!("  {} item(s) embedded", embedded)));
    }

    Ok(())
}
