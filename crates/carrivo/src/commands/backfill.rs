//! Backfill command - generate embeddings for stored items.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::json;

use carrivo_domain::{backfill_embeddings, reindex_embeddings};
use carrivo_knowledge::Collection;

use super::{Context, spinner};
use crate::app;

/// Arguments for the backfill command.
#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Only this collection: faq or roadmaps (default: both)
    #[arg(long)]
    pub collection: Option<Collection>,

    /// Re-embed items that already have a vector
    #[arg(long)]
    pub force: bool,

    /// Rebuild every vector, e.g. after changing the embedding model
    #[arg(long, conflicts_with_all = ["collection", "force"])]
    pub reindex: bool,
}

/// Run the backfill command.
pub async fn run(args: BackfillArgs, ctx: &Context) -> Result<()> {
    let config = ctx.settings();
    let store = app::open_store(config)?;
    let pool = app::build_embeddings(config)?;
    let green = Style::new().green();
    let dim = Style::new().dim();

    if args.reindex {
        let progress = spinner(ctx, "Re-embedding all items...");
        let report = reindex_embeddings(&store, &pool).await;
        progress.finish_and_clear();
        let report = report?;

        if ctx.json_output {
            let body = json!({
                "total": report.total,
                "embedded": report.embedded,
                "skipped": report.skipped,
                "elapsed_ms": report.elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!(
                "{} Reindexed {}/{} item(s) in {:.1}s",
                green.apply_to("✓"),
                report.embedded,
                report.total,
                report.elapsed.as_secs_f32()
            );
            if report.skipped > 0 {
                println!("{}", dim.apply_to(format!("  {} skipped", report.skipped)));
            }
        }
        return Ok(());
    }

    let collections = match args.collection {
        Some(collection) => vec![collection],
        None => Collection::ALL.to_vec(),
    };

    let mut rows = Vec::new();
    for collection in collections {
        let progress = spinner(ctx, &format!("Embedding {}...", collection));
        let report = backfill_embeddings(&store, &pool, collection, args.force).await;
        progress.finish_and_clear();
        let report = report?;
        let indexed = store.indexed_count(collection)?;

        if !ctx.json_output {
            println!(
                "{} {}: embedded {}/{} ({} indexed)",
                green.apply_to("✓"),
                collection,
                report.embedded,
                report.candidates,
                indexed
            );
            if report.skipped > 0 {
                println!("{}", dim.apply_to(format!("  {} skipped", report.skipped)));
            }
        }
        rows.push(json!({
            "collection": collection,
            "candidates": report.candidates,
            "embedded": report.embedded,
            "skipped": report.skipped,
            "indexed": indexed,
            "elapsed_ms": report.elapsed.as_millis() as u64,
        }));
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(())
}
