//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/carrivo/config.toml` (XDG user config, or `CARRIVO_CONFIG_DIR`)
//! 2. `./carrivo.toml` (project-local)
//! 3. An explicit file passed with `--config`

use std::path::{Path, PathBuf};

use crate::{APP_NAME, CarrivoConfig, ConfigError, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "carrivo.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Environment variable to override the user config directory.
pub const CONFIG_DIR_ENV: &str = "CARRIVO_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: CarrivoConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None, None)
}

/// Load configuration with explicit control over every layer.
///
/// `config_dir` overrides both `CARRIVO_CONFIG_DIR` and the platform default.
/// `explicit_file` is the `--config` layer; unlike discovered layers it must
/// exist and parse.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    explicit_file: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = CarrivoConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit_file {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    config.validate()?;
    check_plaintext_keys(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CarrivoConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CarrivoConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &CarrivoConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Get the user config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory.
///
/// Checks `CARRIVO_CONFIG_DIR` first, then falls back to the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a discovered config file and merge it into `config`.
///
/// Missing files are skipped; malformed ones become warnings.
fn load_layer(config: &mut CarrivoConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

/// Check for plaintext API keys in the config and emit warnings.
fn check_plaintext_keys(config: &CarrivoConfig, warnings: &mut Vec<String>) {
    if let Some(ref llm) = config.llm
        && llm.has_plaintext_api_key()
    {
        warnings.push(format!(
            "API key for {} is stored in plaintext in the config file. Prefer the {} environment variable.",
            llm.backend,
            llm.api_key_env_var()
        ));
    }

    if let Some(ref embedding) = config.embedding
        && embedding.openai.as_ref().is_some_and(|o| o.api_key.is_some())
    {
        warnings.push(
            "OpenAI embedding API key is stored in plaintext in the config file.".to_string(),
        );
    }

    if let Some(ref knowledge) = config.knowledge
        && knowledge.remote.as_ref().is_some_and(|r| r.api_key.is_some())
    {
        warnings.push("Remote index API key is stored in plaintext in the config file.".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    use crate::Backend;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\nbackend = \"ollama\"\nmodel = \"qwen2.5\"\n").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.llm.as_ref().unwrap().backend, Backend::Ollama);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded = load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert!(loaded.config.llm.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_layers_override_in_order() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let explicit = TempDir::new().unwrap();

        fs::write(
            user.path().join("config.toml"),
            "[retrieval]\nthreshold = 0.4\n\n[chat]\nmax_tokens = 100\n",
        )
        .unwrap();
        fs::write(
            project.path().join("carrivo.toml"),
            "[retrieval]\nthreshold = 0.55\n",
        )
        .unwrap();
        let explicit_path = explicit.path().join("override.toml");
        fs::write(&explicit_path, "[chat]\nmax_tokens = 50\n").unwrap();

        let loaded = load_config_with_options(
            Some(project.path()),
            Some(user.path()),
            Some(&explicit_path),
        )
        .unwrap();

        assert_eq!(loaded.config.retrieval_or_default().threshold, 0.55);
        assert_eq!(loaded.config.chat_or_default().max_tokens, 50);
        assert_eq!(loaded.loaded_from().len(), 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let result = load_config_with_options(
            Some(project.path()),
            Some(user.path()),
            Some(Path::new("/nonexistent/carrivo.toml")),
        );
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_malformed_project_config_warns_but_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("carrivo.toml"), "not toml {{{").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_plaintext_key_warning() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("carrivo.toml"),
            "[llm]\napi_key = \"gsk-secret\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_invalid_values_fail_loading() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("carrivo.toml"),
            "[embedding]\nworkers = 0\n",
        )
        .unwrap();

        let result = load_config_with_options(Some(project.path()), Some(user.path()), None);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CarrivoConfig::new();
        config.chat = Some(crate::ChatConfig {
            max_message_chars: 500,
            ..Default::default()
        });

        save_config(&config, &path).unwrap();
        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.chat_or_default().max_message_chars, 500);
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let dir = TempDir::new().unwrap();
        // SAFETY: env-mutating tests are serialized.
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        assert_eq!(xdg_config_path(), Some(dir.path().join("config.toml")));
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        if let Some(path) = xdg_config_path() {
            assert!(path.ends_with("carrivo/config.toml"));
        }
    }
}
