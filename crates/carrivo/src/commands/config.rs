//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./carrivo.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn key_status(present: bool) -> &'static str {
    if present { "(key found)" } else { "(no key)" }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.config;
    let config = &loaded.config;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# Carrivo Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let llm = config.llm_or_default();
    println!("LLM:");
    println!(
        "  {} / {}  {}",
        llm.backend,
        llm.model.as_deref().unwrap_or("(backend default)"),
        key_status(llm.resolve_api_key().is_some())
    );
    println!();

    let embedding = config.embedding_or_default();
    println!("Embeddings:");
    println!(
        "  {} ({} dims, {} workers, queue {})",
        embedding.provider_name(),
        embedding.effective_dimensions(),
        embedding.workers,
        embedding.queue_depth
    );
    println!();

    let retrieval = config.retrieval_or_default();
    println!("Retrieval:");
    println!(
        "  threshold {} (lexical {}), k faq {} / roadmaps {}",
        retrieval.threshold, retrieval.lexical_threshold, retrieval.k_faq, retrieval.k_roadmaps
    );
    println!();

    let knowledge = config.knowledge_or_default();
    println!("Storage:");
    println!("  knowledge: {}", knowledge.database_path().display());
    println!(
        "  sessions:  {}",
        config.session_or_default().database_path().display()
    );
    if let Some(ref remote) = knowledge.remote {
        println!(
            "  remote:    {}  {}",
            remote.url,
            key_status(remote.require_api_key().is_ok())
        );
    }
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = &ctx.config;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'carrivo config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

const TEMPLATE: &str = r#"# Carrivo Configuration

# Chat-completion backend: groq, openai, ollama or custom
[llm]
backend = "groq"
# model = "llama-3.1-8b-instant"
# api_key_env = "GROQ_API_KEY"

# Embedding provider: local, openai or mock
[embedding]
provider = "local"
dimensions = 384
workers = 2

[retrieval]
threshold = 0.5
k_faq = 5
k_roadmaps = 3

# Remote vector index (PostgREST / Supabase). Omit to use the local store.
# [knowledge.remote]
# url = "https://your-project.supabase.co"
# api_key_env = "SUPABASE_KEY"

[chat]
max_message_chars = 2000
contextualize = true

# [logging]
# level = "info"
# directory = "/var/log/carrivo"
"#;

fn init_path(local: bool) -> Result<PathBuf> {
    if local {
        return Ok(PathBuf::from("carrivo.toml"));
    }
    let dir = carrivo_config::xdg_config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("config.toml"))
}

fn cmd_init(local: bool) -> Result<()> {
    let path = init_path(local)?;

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, TEMPLATE)?;
    println!("✓ Created {}", path.display());
    Ok(())
}

fn cmd_path() -> Result<()> {
    match carrivo_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("Could not determine config directory"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_and_validates() {
        let config = carrivo_config::CarrivoConfig::from_toml(TEMPLATE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.retrieval_or_default().threshold, 0.5);
        assert_eq!(config.embedding_or_default().effective_dimensions(), 384);
    }
}
