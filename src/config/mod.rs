//! Configuration module for magctl-rs
//!
//! The whole application is configured by one TOML file, `magctl.toml`.
//! It is looked up in the platform-appropriate config directory unless a
//! path is given explicitly (the `MAGCTL_CONFIG` environment variable in
//! the binary):
//!
//! - **Linux**: `~/.config/magctl-rs/magctl.toml`
//! - **macOS**: `~/Library/Application Support/magctl-rs/magctl.toml`
//! - **Windows**: `%APPDATA%\magctl-rs\magctl.toml`
//!
//! # Example
//!
//! ```toml
//! [sampler]
//! interval_ms = 5
//!
//! [worker]
//! period_ms = 50
//! sample_vision = true
//!
//! [actuator]
//! axis_limit = 10.0
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{MagCtlError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "magctl-rs";

/// Config filename
pub const CONFIG_FILE: &str = "magctl.toml";

/// Get the default config file path
pub fn default_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerSettings,
    pub worker: WorkerSettings,
    pub vision: VisionSettings,
    pub camera: CameraSettings,
    pub actuator: ActuatorSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MagCtlError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| MagCtlError::Serialization(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults if it is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save the config as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| MagCtlError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sampler.interval_ms == 0 {
            return Err(MagCtlError::Config(
                "sampler.interval_ms must be positive".to_string(),
            ));
        }
        if self.worker.period_ms == 0 {
            return Err(MagCtlError::Config(
                "worker.period_ms must be positive".to_string(),
            ));
        }
        if self.worker.zero_attempts == 0 {
            return Err(MagCtlError::Config(
                "worker.zero_attempts must be at least 1".to_string(),
            ));
        }
        if self.vision.backoff_min_ms == 0 || self.vision.backoff_min_ms > self.vision.backoff_max_ms
        {
            return Err(MagCtlError::Config(format!(
                "vision backoff must satisfy 0 < min ({}) <= max ({})",
                self.vision.backoff_min_ms, self.vision.backoff_max_ms
            )));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(MagCtlError::Config(
                "camera dimensions must be positive".to_string(),
            ));
        }
        if let Some(limit) = self.actuator.axis_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(MagCtlError::Config(format!(
                    "actuator.axis_limit must be a positive number, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }
}
