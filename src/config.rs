//! Client configuration.

use crate::error::{PromptError, Result};
use crate::provider::ProviderSelection;
use crate::version::VersionNumbering;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding [`Config::api_base_url`]
pub const BASE_URL_ENV: &str = "PROMPTVAULT_API_BASE_URL";

/// Configuration for a prompt workbench
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the prompt service API
    pub api_base_url: String,
    /// How new version numbers are allocated
    pub numbering: VersionNumbering,
    /// Provider key used until providers are loaded or chosen
    pub default_provider: String,
    pub default_model: String,
    /// Provider keys offered when no providers are configured
    pub legacy_providers: Vec<String>,
    /// Maximum substituted prompt length in characters
    pub max_prompt_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            numbering: VersionNumbering::CountBased,
            default_provider: "openai".to_string(),
            default_model: "gpt-3.5-turbo".to_string(),
            legacy_providers: vec![
                "openai".to_string(),
                "gemini".to_string(),
                "ollama".to_string(),
            ],
            max_prompt_length: 100_000,
        }
    }
}

impl Config {
    /// Load from the user config directory, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load a config file without environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PromptError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PromptError::Config(format!("Invalid config {}: {}", path.display(), e)))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                debug!("Using API base URL from {}", BASE_URL_ENV);
                self.api_base_url = url;
            }
        }
    }

    /// `<config dir>/promptvault/config.json`
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("promptvault").join("config.json"))
    }

    fn config_dir() -> Result<PathBuf> {
        let home_dir = home::home_dir()
            .ok_or_else(|| PromptError::Config("Could not determine home directory".to_string()))?;

        #[cfg(target_os = "macos")]
        let config_dir = home_dir.join("Library").join("Application Support");

        #[cfg(target_os = "windows")]
        let config_dir = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join("AppData").join("Roaming"));

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join(".config"));

        Ok(config_dir)
    }

    /// Selection used before any provider is loaded or chosen
    pub fn default_selection(&self) -> ProviderSelection {
        ProviderSelection::legacy(&self.default_provider, &self.default_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.numbering, VersionNumbering::CountBased);
        assert_eq!(config.legacy_providers, vec!["openai", "gemini", "ollama"]);
        assert_eq!(
            config.default_selection(),
            ProviderSelection::legacy("openai", "gpt-3.5-turbo")
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"api_base_url": "https://prompts.example.com/api/v1", "numbering": "max_based"}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api_base_url, "https://prompts.example.com/api/v1");
        assert_eq!(config.numbering, VersionNumbering::MaxBased);
        assert_eq!(config.default_model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::from_file(&path), Err(PromptError::Config(_))));

        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(Config::from_file(&missing), Err(PromptError::Config(_))));
    }

    #[test]
    fn test_default_path_layout() {
        let path = Config::default_path().unwrap();
        assert!(path.ends_with("promptvault/config.json"));
    }
}
