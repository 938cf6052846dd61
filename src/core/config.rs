use crate::worker::WorkerConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

pub const API_KEY_ENV: &str = "CURRENCY_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.currencyapi.com/v3/";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_key: None,
            base_url: default_base_url(),
        }
    }
}

/// Worker settings as written in the config file. Zero or missing values
/// fall back to the defaults of [`WorkerConfig`].
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WorkerSettings {
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub fetch_interval_secs: u64,
    #[serde(default)]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "ratekeeper", "ratekeeper")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Result<String> {
        let from_env = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        from_env
            .or_else(|| self.provider.api_key.clone().filter(|k| !k.is_empty()))
            .with_context(|| {
                format!("No API key configured: set {API_KEY_ENV} or provider.api_key")
            })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            currencies: self
                .worker
                .currencies
                .iter()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
            fetch_interval: Duration::from_secs(self.worker.fetch_interval_secs),
            request_timeout: Duration::from_secs(self.worker.request_timeout_secs),
        }
        .resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
provider:
  api_key: "secret"
  base_url: "http://localhost:9999/v3/"
worker:
  currencies: ["usd", " jpy "]
  fetch_interval_secs: 30
  request_timeout_secs: 5
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.provider.api_key.as_deref(), Some("secret"));
        assert_eq!(config.provider.base_url, "http://localhost:9999/v3/");

        let worker = config.worker_config();
        assert_eq!(worker.currencies, vec!["USD".to_string(), "JPY".to_string()]);
        assert_eq!(worker.fetch_interval, Duration::from_secs(30));
        assert_eq!(worker.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert!(config.provider.api_key.is_none());
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);

        let worker = config.worker_config();
        let defaults = WorkerConfig::default();
        assert_eq!(worker.currencies, defaults.currencies);
        assert_eq!(worker.fetch_interval, defaults.fetch_interval);
        assert_eq!(worker.request_timeout, defaults.request_timeout);
    }

    #[test]
    fn test_load_from_path() {
        let file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        fs::write(
            file.path(),
            "worker:\n  currencies: [\"CHF\"]\n  fetch_interval_secs: 120\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        let worker = config.worker_config();
        assert_eq!(worker.currencies, vec!["CHF".to_string()]);
        assert_eq!(worker.fetch_interval, Duration::from_secs(120));
        assert_eq!(worker.request_timeout, WorkerConfig::default().request_timeout);
    }

    #[test]
    fn test_load_from_missing_path_fails_with_context() {
        let err = AppConfig::load_from_path("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
