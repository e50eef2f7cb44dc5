//! Configuration management for pushpilot

use crate::constants::*;
use crate::error::{Error, Result};
use crate::options::UploadOptions;
use crate::transport::HttpSettings;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration directory name
const CONFIG_DIR: &str = "pushpilot";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

const MIB: u64 = 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub upload: UploadDefaults,
    #[serde(default)]
    pub http: HttpSettings,
    pub logging: Option<LoggingConfig>,
}

/// Control-plane credentials used to request signed upload URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    pub endpoint: String,
    pub token_id: String,
    pub secret_key: String,
}

/// Defaults applied to every upload unless overridden on the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDefaults {
    /// Chunk size in MiB (default: 16)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
        }
    }
}

impl UploadDefaults {
    /// Seed upload options with these defaults
    pub fn to_options(&self) -> UploadOptions {
        UploadOptions::new()
            .chunk_size(self.chunk_size_mb.saturating_mul(MIB))
            .max_retries(self.max_retries)
            .retry_delay(Duration::from_millis(self.retry_delay_ms))
            .max_retry_delay(Duration::from_millis(self.max_retry_delay_ms))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_chunk_size_mb() -> u64 {
    16
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_retry_delay() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
    let config_dir = home.join(".config").join(CONFIG_DIR);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    Ok(config_dir)
}

/// Get the configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Load configuration from file
pub fn load_config() -> Result<ConfigFile> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        return Err(Error::ConfigNotFound(config_path));
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file: {}", e))
    })?;

    parse_config(&content)
}

/// Parse configuration from TOML text
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    toml::from_str(content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config file: {}", e))
    })
}

/// Save configuration to file
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let config_path = get_config_path()?;

    let content = toml::to_string_pretty(config).map_err(|e| {
        Error::InvalidConfig(format!("Failed to serialize config: {}", e))
    })?;

    fs::write(&config_path, content).map_err(|e| {
        Error::Config(format!("Failed to write config file: {}", e))
    })?;

    // Credentials live in this file: read/write for owner only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&config_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&config_path, perms)?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ConfigFile) -> Result<()> {
    let endpoint = &config.control_plane.endpoint;
    if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
        return Err(Error::InvalidInput(format!(
            "Control plane endpoint must be an http(s) URL, got '{}'",
            endpoint
        )));
    }

    if config.control_plane.token_id.is_empty() || config.control_plane.secret_key.is_empty() {
        return Err(Error::Config(
            "Both token_id and secret_key must be set for the control plane".to_string()
        ));
    }

    let chunk_size = config.upload.chunk_size_mb.saturating_mul(MIB);
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(Error::InvalidInput(format!(
            "chunk_size_mb must be between 5 and 500 (got {})",
            config.upload.chunk_size_mb
        )));
    }

    if config.upload.max_retry_delay_ms < config.upload.retry_delay_ms {
        return Err(Error::InvalidInput(
            "max_retry_delay_ms cannot be lower than retry_delay_ms".to_string()
        ));
    }

    Ok(())
}

/// Check if configuration exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

/// Public alias for ConfigFile (used by lib.rs)
pub use ConfigFile as Config;
