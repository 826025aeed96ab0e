use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// API key for the search-results provider. Falls back to the
    /// `SERPAPI_API_KEY` environment variable when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_google_domain")]
    pub google_domain: String,
    #[serde(default = "default_hl")]
    pub hl: String,
    /// Country code for the `gl` parameter. Omitted from requests when unset.
    #[serde(default)]
    pub gl: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            google_domain: default_google_domain(),
            hl: default_hl(),
            gl: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key from config or environment.
    ///
    /// A missing key is fatal to the run: every command that talks to the
    /// provider calls this before issuing any request.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref() {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        match std::env::var("SERPAPI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => anyhow::bail!(
                "search provider is not configured: set provider.api_key or SERPAPI_API_KEY"
            ),
        }
    }
}

fn default_base_url() -> String {
    "https://serpapi.com/search".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_google_domain() -> String {
    "google.com".to_string()
}
fn default_hl() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Deepest absolute rank scanned before a query is reported not found.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// User id assumed by CLI commands when `--user` is not given.
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            default_user: default_user(),
        }
    }
}

fn default_max_depth() -> u32 {
    100
}
fn default_user() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.tracking.max_depth == 0 {
        anyhow::bail!("tracking.max_depth must be > 0");
    }

    if config.provider.timeout_secs == 0 {
        anyhow::bail!("provider.timeout_secs must be > 0");
    }

    if config.provider.base_url.trim().is_empty() {
        anyhow::bail!("provider.base_url must not be empty");
    }

    Ok(config)
}
