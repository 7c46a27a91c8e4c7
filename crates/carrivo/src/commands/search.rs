//! Search command - run the retrieval cascade without generating a reply.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;

use carrivo_domain::{KeywordIntentClassifier, SearchReport, SearchService};
use carrivo_knowledge::{Collection, RetrievalTier};

use super::Context;
use crate::app;

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    #[arg(required = true)]
    pub query: String,

    /// Collection to search: faq or roadmaps (default: from the query intent)
    #[arg(long)]
    pub collection: Option<Collection>,

    /// Skip the query embedding and use the lexical tier only
    #[arg(long)]
    pub lexical: bool,
}

#[derive(Debug, Serialize)]
struct Hit {
    id: String,
    title: String,
    score: f32,
    tier: RetrievalTier,
}

#[derive(Debug, Serialize)]
struct Output {
    query: String,
    collection: Collection,
    tier: Option<RetrievalTier>,
    results: Vec<Hit>,
    failures: Vec<String>,
    embedding_error: Option<String>,
}

impl Output {
    fn new(query: &str, report: SearchReport) -> Self {
        Self {
            query: query.to_string(),
            collection: report.collection,
            tier: report.outcome.tier,
            results: report
                .outcome
                .results
                .iter()
                .map(|r| Hit {
                    id: r.id().to_string(),
                    title: r.item().title().to_string(),
                    score: r.score,
                    tier: r.tier,
                })
                .collect(),
            failures: report
                .outcome
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.tier, f.reason))
                .collect(),
            embedding_error: report.embedding_error,
        }
    }
}

/// Run the search command.
pub async fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let config = ctx.settings();
    let store = app::open_store(config)?;
    let retrieval = app::build_retrieval(config, store)?;
    let embeddings = if args.lexical {
        None
    } else {
        app::try_build_embeddings(config)
    };

    let search = SearchService::new(
        retrieval,
        embeddings,
        Arc::new(KeywordIntentClassifier::new()),
    );
    let report = search.search(&args.query, args.collection).await;
    let output = Output::new(&args.query, report);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "Searching {}: {}",
        output.collection,
        dim.apply_to(&output.query)
    );

    if output.results.is_empty() {
        println!("{}", dim.apply_to("No results found"));
    } else {
        for (i, hit) in output.results.iter().enumerate() {
            println!(
                "{}. {} {}",
                i + 1,
                hit.title,
                dim.apply_to(format!("({}, score: {:.3})", hit.tier, hit.score))
            );
            if ctx.verbose {
                println!("   {}", dim.apply_to(&hit.id));
            }
        }
    }

    if ctx.verbose {
        if let Some(ref error) = output.embedding_error {
            println!("{}", dim.apply_to(format!("Query embedding failed: {}", error)));
        }
        for failure in &output.failures {
            println!("{}", dim.apply_to(format!("Skipped {}", failure)));
        }
    }

    Ok(())
}
