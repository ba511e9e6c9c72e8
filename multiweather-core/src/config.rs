use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::ProviderId;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DEADLINE_SECS: u64 = 30;

/// Configuration for a single provider (API key and optional endpoint override).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Replaces the provider's public endpoint, e.g. for a local proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen: String,

    /// Provider ids fanned out for every query, in order.
    pub primaries: Vec<String>,

    /// Per-provider timeout in seconds; 0 disables it.
    pub provider_timeout_secs: u64,

    /// Whole-query deadline in seconds; 0 disables it.
    pub deadline_secs: u64,

    /// Example TOML:
    /// [providers.openweathermap]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            primaries: vec![
                ProviderId::OpenWeatherMap.to_string(),
                ProviderId::WeatherUnderground.to_string(),
            ],
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            deadline_secs: DEFAULT_DEADLINE_SECS,
            providers: HashMap::new(),
        }
    }
}

impl Config {
    /// Primary providers as strongly-typed ids. Rejects unknown and secondary ids.
    pub fn primary_ids(&self) -> Result<Vec<ProviderId>> {
        if self.primaries.is_empty() {
            return Err(anyhow!(
                "No primary providers configured.\n\
                 Hint: set `primaries = [\"openweathermap\", \"weatherunderground\"]` in the config file."
            ));
        }

        self.primaries
            .iter()
            .map(|s| {
                let id = ProviderId::try_from(s.as_str())?;
                if !id.is_primary() {
                    return Err(anyhow!("Provider '{id}' cannot be listed in `primaries`."));
                }
                Ok(id)
            })
            .collect()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.listen))
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.provider_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        non_zero_secs(self.deadline_secs)
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Load config from an explicit path, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "multiweather", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set or replace a provider API key, keeping any endpoint override.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig { api_key, base_url: None });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
