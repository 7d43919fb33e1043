//! Gateway and generation settings.
//!
//! Precedence: defaults < TOML file (`MINICRM_CONFIG`, else `config/minicrm.toml`) < env
//! `MINICRM__*` (separator `__`, e.g. `MINICRM__PROVIDER__MODEL`).
//!
//! | Key | Default |
//! |-----|---------|
//! | bind_addr | 127.0.0.1:8000 |
//! | storage_path | ./data/minicrm |
//! | provider.base_url | https://openrouter.ai/api/v1 |
//! | provider.model | meta-llama/llama-3.3-70b-instruct |
//! | provider.api_key | `OPENROUTER_API_KEY` |
//! | provider.timeout_secs | 60 |
//! | generation.language | Brazilian Portuguese |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::prompt::DEFAULT_LANGUAGE;

const DEFAULT_CONFIG_PATH: &str = "config/minicrm.toml";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_storage_path() -> String {
    "./data/minicrm".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Never logged.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Language the outreach messages are written in.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            storage_path: default_storage_path(),
            provider: ProviderSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl CrmConfig {
    /// Load from file and environment. `OPENROUTER_API_KEY` fills in a missing provider key.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("MINICRM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut loaded = Self::load_from(Path::new(&config_path))?;
        if loaded.provider.api_key.as_deref().map(str::trim).unwrap_or("").is_empty() {
            loaded.provider.api_key = env_opt_string("OPENROUTER_API_KEY");
        }
        Ok(loaded)
    }

    /// Load from an explicit file (skipped when absent) plus `MINICRM__*` environment.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        builder
            .add_source(config::Environment::with_prefix("MINICRM").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CrmConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.storage_path, "./data/minicrm");
        assert_eq!(cfg.provider.model, DEFAULT_MODEL);
        assert_eq!(cfg.provider.timeout_secs, 60);
        assert_eq!(cfg.generation.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn file_overrides_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minicrm.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "bind_addr = \"0.0.0.0:9000\"\n[provider]\nmodel = \"openai/gpt-4o-mini\"\n[generation]\nlanguage = \"English\""
        )
        .unwrap();

        let cfg = CrmConfig::load_from(&path).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.provider.model, "openai/gpt-4o-mini");
        assert_eq!(cfg.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.generation.language, "English");
    }
}
