//! FieldDevice trait for the coil output hardware
//!
//! The board driver is an opaque capability provider: anything that can take
//! a full three-axis command implements [`FieldDevice`]. The actuator is the
//! only caller, and it always sends complete vectors.

use crate::error::DeviceError;
use crate::types::FieldVector;
use std::collections::VecDeque;

/// Size of the rolling window for recent write times
const RECENT_WINDOW_SIZE: usize = 100;

/// Unified interface for field output devices
///
/// Implementations must be `Send` so the actuator can be driven from the
/// worker thread.
#[cfg_attr(test, mockall::automock)]
pub trait FieldDevice: Send {
    /// Command all three axes at once
    fn write_vector(&mut self, vector: FieldVector) -> Result<(), DeviceError>;

    /// Human-readable device name for logs
    fn name(&self) -> String;
}

/// Statistics for actuator writes
#[derive(Debug, Clone)]
pub struct ActuatorStats {
    /// Total number of accepted writes
    pub successful_writes: u64,
    /// Total number of failed writes
    pub failed_writes: u64,
    /// Total write time in microseconds
    pub total_write_time_us: u64,
    /// Last write time in microseconds
    pub last_write_time_us: u64,
    /// Rolling window of recent write times
    pub recent_write_times: VecDeque<u64>,
    /// Last error reported by the device
    pub last_error: Option<DeviceError>,
}

impl Default for ActuatorStats {
    fn default() -> Self {
        Self {
            successful_writes: 0,
            failed_writes: 0,
            total_write_time_us: 0,
            last_write_time_us: 0,
            recent_write_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
            last_error: None,
        }
    }
}

impl ActuatorStats {
    /// Calculate average write time in microseconds
    pub fn avg_write_time_us(&self) -> f64 {
        if self.successful_writes == 0 {
            0.0
        } else {
            self.total_write_time_us as f64 / self.successful_writes as f64
        }
    }

    /// Calculate success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_writes + self.failed_writes;
        if total == 0 {
            100.0
        } else {
            (self.successful_writes as f64 / total as f64) * 100.0
        }
    }

    pub fn record_success(&mut self, time_us: u64) {
        self.successful_writes += 1;
        self.total_write_time_us += time_us;
        self.last_write_time_us = time_us;

        self.recent_write_times.push_back(time_us);
        if self.recent_write_times.len() > RECENT_WINDOW_SIZE {
            self.recent_write_times.pop_front();
        }
    }

    pub fn record_failure(&mut self, error: DeviceError) {
        self.failed_writes += 1;
        self.last_error = Some(error);
    }

    /// Calculate jitter (max - min) over recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_write_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_write_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }
}
