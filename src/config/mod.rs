pub mod oauth_client;
pub use oauth_client::OAuthClient;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete platform configuration.
///
/// Loaded from TOML (every section optional), then overridden by
/// environment variables. Secrets never live in this file: the encryption
/// key, JWT secret and provider client credentials come from the
/// environment only.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// SQLite store of record
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "area.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// OAuth flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Public base URL providers redirect back to
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
    /// Lifetime of a CSRF state parameter
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// How often expired states are purged
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_callback_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    300
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            callback_base_url: default_callback_base_url(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

/// Dispatch engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Refresh an access token when it expires within this window
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_seconds: i64,
    /// Consecutive failures before a worker escalates to error-level logs
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u32,
}

fn default_refresh_threshold() -> i64 {
    90
}

fn default_failure_alert_threshold() -> u32 {
    5
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_seconds: default_refresh_threshold(),
            failure_alert_threshold: default_failure_alert_threshold(),
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            oauth: OAuthConfig::default(),
            dispatch: DispatchConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl AreaConfig {
    /// Overrides file values with `AREA_*` environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AREA_DATABASE") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("AREA_CALLBACK_BASE_URL") {
            self.oauth.callback_base_url = v;
        }
        if let Ok(v) = std::env::var("AREA_API_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.api.port = port;
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<AreaConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: AreaConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}

/// Loads `AREA_CONFIG` if set (defaults otherwise) and applies env overrides.
pub fn load_from_env() -> Result<AreaConfig> {
    let mut config = match std::env::var("AREA_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration file");
            load_config(&path)?
        }
        Err(_) => {
            tracing::debug!("AREA_CONFIG not set, using defaults");
            AreaConfig::default()
        }
    };
    config.apply_env_overrides();
    Ok(config)
}
