//! Configuration loading and root folder resolution
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PCV_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The resolved values are handed to constructors explicitly; nothing here is
//! stored in process-wide state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PCV_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "pcv.db";

/// Blob directory name inside the root folder
pub const BLOB_DIR_NAME: &str = "blobs";

/// Fingerprint the service was originally deployed with
pub const DEFAULT_EXPECTED_FINGERPRINT: &str = "1111";

/// Artificial latency applied to every verification job
pub const DEFAULT_VERIFICATION_DELAY_MS: u64 = 1000;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5780";
pub const DEFAULT_LOGIN_URL: &str = "/login";

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Settings of the verification pipeline and its queue runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Fingerprint a decompressed upload must match to score
    pub expected_fingerprint: String,
    /// Fixed delay applied before persisting each result
    pub verification_delay_ms: u64,
    /// Number of concurrent verification workers
    pub worker_count: usize,
    /// Attempts per job before the queue gives up on it
    pub max_attempts: u32,
    /// Base backoff between attempts (doubles per attempt)
    pub retry_backoff_ms: u64,
    /// How often idle workers re-check the queue without a wakeup
    pub poll_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            expected_fingerprint: DEFAULT_EXPECTED_FINGERPRINT.to_string(),
            verification_delay_ms: DEFAULT_VERIFICATION_DELAY_MS,
            worker_count: 4,
            max_attempts: 5,
            retry_backoff_ms: 500,
            poll_interval_ms: 2000,
        }
    }
}

impl PipelineSettings {
    /// Reject settings the worker pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.expected_fingerprint.trim().is_empty() {
            return Err(Error::Config("expected_fingerprint must not be empty".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Apply `PCV_*` environment overrides on top of file/default values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("PCV_EXPECTED_FINGERPRINT") {
            self.expected_fingerprint = value;
        }
        if let Some(value) = env_number("PCV_VERIFICATION_DELAY_MS")? {
            self.verification_delay_ms = value;
        }
        if let Some(value) = env_number("PCV_WORKER_COUNT")? {
            self.worker_count = value;
        }
        if let Some(value) = env_number("PCV_MAX_ATTEMPTS")? {
            self.max_attempts = value;
        }
        if let Some(value) = env_number("PCV_RETRY_BACKOFF_MS")? {
            self.retry_backoff_ms = value;
        }
        if let Some(value) = env_number("PCV_POLL_INTERVAL_MS")? {
            self.poll_interval_ms = value;
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    /// Where the auth proxy sends users without an identity
    pub login_url: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Load the TOML config.
///
/// An explicit path must exist and parse. Without one, the platform default
/// locations are tried and a missing file yields the compiled defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_file() {
            Some(path) => path,
            None => {
                info!("No config file found, using compiled defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML config (used by tests and first-run tooling)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Default configuration file for the platform, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pcv").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pcv/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the root folder (CLI → ENV → TOML → OS default)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
        warn!("{} is set but empty, ignoring", ROOT_FOLDER_ENV);
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pcv"))
        .unwrap_or_else(|| PathBuf::from("./pcv_data"))
}

/// Creates the root folder layout and hands out paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root and blob directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating root folder: {}", self.root.display());
        }
        std::fs::create_dir_all(self.blob_path())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.root.join(BLOB_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_settings_are_valid() {
        let settings = PipelineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.verification_delay_ms, 1000);
        assert_eq!(settings.expected_fingerprint, "1111");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = PipelineSettings {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_fingerprint_rejected() {
        let settings = PipelineSettings {
            expected_fingerprint: "  ".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_initializer_paths() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/pcv"));
        assert_eq!(init.database_path(), PathBuf::from("/srv/pcv/pcv.db"));
        assert_eq!(init.blob_path(), PathBuf::from("/srv/pcv/blobs"));
    }
}
