//! Application configuration for ServiceCraft.
//!
//! User config lives at `~/.servicecraft/servicecraft.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ServiceCraftError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "servicecraft.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".servicecraft";

// ---------------------------------------------------------------------------
// Config structs (matching servicecraft.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings for blueprint generation.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Where the trigger rule set and alias table come from.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the blueprint draft database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Practice used when a request file does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_id: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            practice_id: None,
        }
    }
}

fn default_database_path() -> String {
    "var/servicecraft.db".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for blueprint generation.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Base URL of the chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// The single bounded wait for a completion, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sent as `HTTP-Referer` for provider attribution.
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title` for provider attribution.
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            referer: default_referer(),
            app_title: default_app_title(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_tokens() -> u32 {
    16_000
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_referer() -> String {
    "https://servicecraft.local".into()
}
fn default_app_title() -> String {
    "ServiceCraft Service Line Builder".into()
}

/// `[scoring]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Versioned trigger rule set file (TOML or JSON). Built-in catalog when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,

    /// Alias table file (TOML). Built-in discovery aliases when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Generation settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime provider settings handed to the generation client.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Chat-completions base URL.
    pub base_url: Url,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// `HTTP-Referer` header value.
    pub referer: String,
    /// `X-Title` header value.
    pub app_title: String,
}

impl TryFrom<&AppConfig> for GenerationSettings {
    type Error = ServiceCraftError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let or = &config.openrouter;
        let base_url = Url::parse(&or.base_url).map_err(|e| {
            ServiceCraftError::config(format!("invalid openrouter.base_url '{}': {e}", or.base_url))
        })?;

        Ok(Self {
            base_url,
            model: or.default_model.clone(),
            temperature: or.temperature,
            max_tokens: or.max_tokens,
            timeout_secs: or.timeout_secs,
            referer: or.referer.clone(),
            app_title: or.app_title.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.servicecraft/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ServiceCraftError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.servicecraft/servicecraft.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ServiceCraftError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ServiceCraftError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ServiceCraftError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ServiceCraftError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ServiceCraftError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ServiceCraftError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(!toml_str.contains("rules_path"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.openrouter.max_tokens, 16_000);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[openrouter]
default_model = "openai/gpt-4o"
timeout_secs = 30

[scoring]
rules_path = "/etc/servicecraft/rules-v3.toml"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.openrouter.default_model, "openai/gpt-4o");
        assert_eq!(config.openrouter.timeout_secs, 30);
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(
            config.scoring.rules_path.as_deref(),
            Some("/etc/servicecraft/rules-v3.toml")
        );
        assert_eq!(config.defaults.database_path, "var/servicecraft.db");
    }

    #[test]
    fn generation_settings_from_app_config() {
        let app = AppConfig::default();
        let settings = GenerationSettings::try_from(&app).expect("valid defaults");
        assert_eq!(settings.base_url.as_str(), "https://openrouter.ai/api/v1");
        assert_eq!(settings.max_tokens, 16_000);
        assert!((settings.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn generation_settings_reject_bad_url() {
        let mut app = AppConfig::default();
        app.openrouter.base_url = "not a url".into();
        let err = GenerationSettings::try_from(&app).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "SC_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
