//! Runtime configuration for pcv-server
//!
//! Built once at startup from the TOML file plus environment overrides and
//! handed to constructors. Nothing reads configuration from globals.

use std::time::Duration;

use pcv_common::config::{
    PipelineSettings, TomlConfig, DEFAULT_BIND_ADDRESS, DEFAULT_LOGIN_URL,
};
use pcv_common::time::millis_to_duration;
use pcv_common::{Error, Result};

use crate::api::identity::login_location;
use crate::worker::WorkerSettings;

/// Resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_address: String,
    /// Where unauthenticated callers are redirected
    pub login_url: String,
    pub pipeline: PipelineSettings,
}

impl ServiceConfig {
    /// Resolve from the TOML file, applying `PCV_*` environment overrides
    pub fn from_toml(toml_config: &TomlConfig) -> Result<Self> {
        let mut pipeline = toml_config.pipeline.clone();
        pipeline.apply_env_overrides()?;
        pipeline.validate()?;

        let bind_address = std::env::var("PCV_BIND_ADDRESS")
            .ok()
            .or_else(|| toml_config.bind_address.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let login_url = std::env::var("PCV_LOGIN_URL")
            .ok()
            .or_else(|| toml_config.login_url.clone())
            .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string());
        login_location(&login_url, "/").map_err(|e| {
            Error::Config(format!("Invalid login_url '{}': {}", login_url, e))
        })?;

        Ok(Self {
            bind_address,
            login_url,
            pipeline,
        })
    }

    pub fn verification_delay(&self) -> Duration {
        millis_to_duration(self.pipeline.verification_delay_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            worker_count: self.pipeline.worker_count,
            max_attempts: self.pipeline.max_attempts,
            retry_backoff: millis_to_duration(self.pipeline.retry_backoff_ms),
            poll_interval: millis_to_duration(self.pipeline.poll_interval_ms),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            pipeline: PipelineSettings::default(),
        }
    }
}
