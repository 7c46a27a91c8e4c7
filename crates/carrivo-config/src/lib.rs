//! Configuration system for the Carrivo assistant.
//!
//! Provides TOML-based configuration with:
//! - One optional section per concern (`[llm]`, `[embedding]`, `[retrieval]`,
//!   `[session]`, `[knowledge]`, `[chat]`, `[logging]`)
//! - Config file layering (XDG user config, project-local `carrivo.toml`,
//!   then an explicit `--config` file)
//! - API key resolution (config file, then the section's `api_key_env`)
//!
//! Every field has a default, so an empty file is a valid config.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, load_config, load_config_file,
    load_config_with_options, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
