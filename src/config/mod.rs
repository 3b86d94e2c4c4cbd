use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub entitlement: EntitlementConfig,
    pub jobs: JobsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Bearer token for the backend. Falls back to the MINUTARY_API_TOKEN
    /// env var when empty.
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.minutary.app".to_string(),
            api_token: None,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Interval between background privilege re-checks (default: 900 = 15 min)
    pub verify_interval_seconds: u64,
    /// Fetch a fresh entitlement as soon as the service starts.
    pub refresh_on_start: bool,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            verify_interval_seconds: 900,
            refresh_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Interval between job status polls (default: 5s)
    pub poll_interval_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 4848 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn api_token(&self) -> Option<String> {
        if let Some(token) = &self.backend.api_token {
            if !token.is_empty() {
                return Some(token.clone());
            }
        }
        std::env::var("MINUTARY_API_TOKEN").ok().filter(|t| !t.is_empty())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
