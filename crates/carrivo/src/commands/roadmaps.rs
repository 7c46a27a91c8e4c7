//! Roadmaps command - browse stored learning roadmaps.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use carrivo_knowledge::{KnowledgeItem, KnowledgeRecord, RoadmapItem};

use super::Context;
use crate::app;

/// Arguments for the roadmaps command.
#[derive(Args, Debug)]
pub struct RoadmapsArgs {
    #[command(subcommand)]
    pub command: RoadmapsCommand,
}

#[derive(Subcommand, Debug)]
pub enum RoadmapsCommand {
    /// List active roadmaps
    List {
        /// Only roadmaps in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one roadmap by slug
    Show {
        /// Roadmap slug, e.g. "backend"
        slug: String,
    },

    /// List roadmap categories
    Categories,
}

fn roadmap(record: &KnowledgeRecord) -> Option<&RoadmapItem> {
    match &record.item {
        KnowledgeItem::Roadmap(roadmap) => Some(roadmap),
        KnowledgeItem::Faq(_) => None,
    }
}

/// Run the roadmaps command.
pub async fn run(args: RoadmapsArgs, ctx: &Context) -> Result<()> {
    let store = app::open_store(ctx.settings())?;
    let dim = Style::new().dim();

    match args.command {
        RoadmapsCommand::List { category } => {
            let records = store.list_roadmaps(category.as_deref())?;
            let roadmaps: Vec<&RoadmapItem> = records.iter().filter_map(roadmap).collect();

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&roadmaps)?);
                return Ok(());
            }
            if roadmaps.is_empty() {
                println!("No roadmaps found. Run 'carrivo seed' to load the built-in set.");
                return Ok(());
            }
            for item in roadmaps {
                println!(
                    "  {:<20} {} {}",
                    style(&item.slug).cyan(),
                    item.title,
                    dim.apply_to(format!("[{}]", item.category))
                );
            }
        }
        RoadmapsCommand::Show { slug } => {
            let record = store.get_roadmap_by_slug(&slug)?;
            let Some(item) = record.as_ref().and_then(roadmap) else {
                anyhow::bail!("No roadmap with slug '{}'", slug);
            };

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(item)?);
                return Ok(());
            }
            println!("{}", style(&item.title).bold());
            println!("{}", dim.apply_to(&item.category));
            println!();
            println!("{}", item.description);
            println!("{}", style(&item.url).underlined());
        }
        RoadmapsCommand::Categories => {
            let categories = store.list_categories()?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else if categories.is_empty() {
                println!("No categories found.");
            } else {
                for category in categories {
                    println!("  {}", category);
                }
            }
        }
    }

    Ok(())
}
