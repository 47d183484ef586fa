//! Settings sections of the application configuration
//!
//! Every section implements `Default` and every field carries a serde
//! default, so a config file only needs to mention what it overrides.
//!
//! # Main Types
//!
//! - [`SamplerSettings`] - Foreground vision tick interval
//! - [`WorkerSettings`] - Background worker period and shutdown behavior
//! - [`VisionSettings`] - Capture backoff and object detection parameters
//! - [`CameraSettings`] - Synthetic camera frame geometry
//! - [`ActuatorSettings`] - Device limits
//! - [`LoggingSettings`] - Log filter and optional log file

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default foreground tick interval in milliseconds
pub const DEFAULT_SAMPLER_INTERVAL_MS: u64 = 5;

/// Default worker period in milliseconds
pub const DEFAULT_WORKER_PERIOD_MS: u64 = 100;

/// Default number of terminal zeroing attempts
pub const DEFAULT_ZERO_ATTEMPTS: u32 = 3;

/// Default time to wait for the worker on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Default first capture backoff
pub const DEFAULT_BACKOFF_MIN_MS: u64 = 250;

/// Default capture backoff ceiling
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 2_000;

/// Settings for the foreground [`crate::vision::ScheduledSampler`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Target tick interval in milliseconds
    pub interval_ms: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLER_INTERVAL_MS,
        }
    }
}

impl SamplerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Settings for the background [`crate::backend::WorkerController`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Initial loop period in milliseconds
    pub period_ms: u64,
    /// Read the latest processed frame from the worker each tick
    pub sample_vision: bool,
    /// Attempts made to zero the actuator when a session ends
    pub zero_attempts: u32,
    /// How long shutdown waits for the worker to reach `Stopped`
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_WORKER_PERIOD_MS,
            sample_vision: false,
            zero_attempts: DEFAULT_ZERO_ATTEMPTS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl WorkerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Settings for the [`crate::vision::VisionPipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    /// First backoff after a failed capture
    pub backoff_min_ms: u64,
    /// Upper bound for the doubling backoff
    pub backoff_max_ms: u64,
    /// Pixels at or above this level count as foreground for detection
    pub detection_threshold: u8,
    /// Smallest component (in pixels) reported as a detection
    pub min_blob_area: u32,
    /// Maximum detections kept per frame
    pub max_detections: usize,
    /// Capture updates enabled at startup
    pub update_enabled: bool,
    /// Filters bypassed at startup
    pub bypass_filters: bool,
    /// Object detection enabled at startup
    pub object_detection: bool,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            backoff_min_ms: DEFAULT_BACKOFF_MIN_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            detection_threshold: 128,
            min_blob_area: 4,
            max_detections: 16,
            update_enabled: true,
            bypass_filters: false,
            object_detection: false,
        }
    }
}

/// Geometry of the synthetic camera used without real hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    /// Radius of the simulated tracked object in pixels
    pub object_radius: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            object_radius: 8,
        }
    }
}

/// Limits applied by the [`crate::backend::FieldActuator`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSettings {
    /// Per-axis magnitude limit; `None` sends values unclamped
    pub axis_limit: Option<f64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is not set
    pub filter: String,
    /// Optional log file, written in addition to stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,magctl_rs=debug".to_string(),
            file: None,
        }
    }
}
