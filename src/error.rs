//! Error handling for the magctl-rs control panel
//!
//! Each subsystem has its own error enum so callers can react to the exact
//! failure class (a device fault is logged and skipped, a compile error is
//! shown to the user, a shutdown failure is escalated). [`MagCtlError`]
//! wraps all of them for code that only needs to propagate.

use thiserror::Error;

pub use crate::routing::CompileError;

/// Errors raised by a field output device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The hardware channel is not available (unplugged, not opened)
    #[error("Device channel unavailable: {0}")]
    Unavailable(String),

    /// The device refused the command
    #[error("Device rejected write: {0}")]
    Rejected(String),

    /// The requested value cannot be sent to a device
    #[error("Invalid value for axis {axis}: {value}")]
    InvalidValue { axis: char, value: f64 },
}

/// Errors raised by a frame source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The vision source is not available
    #[error("Capture source unavailable: {0}")]
    Unavailable(String),

    /// The source did not deliver a frame in time
    #[error("Capture timed out after {0} ms")]
    Timeout(u64),

    /// The source delivered a frame that cannot be used
    #[error("Corrupt frame: {0}")]
    Corrupt(String),
}

/// Control-protocol misuse, rejected without any state change
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// A worker session already exists
    #[error("Worker is already running")]
    AlreadyRunning,

    /// Period or rate is not a positive finite number
    #[error("Invalid worker frequency")]
    InvalidFrequency,

    /// The operating system refused to create the worker thread
    #[error("Worker thread could not be spawned")]
    SpawnFailed,
}

/// Failure to bring the subsystem to a safe state on shutdown
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShutdownError {
    /// The worker did not report `Stopped` in time
    #[error("Worker did not stop within {0} ms")]
    Timeout(u64),

    /// The worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// Terminal zeroing of the actuator failed
    #[error("Failed to zero the field actuator: {0}")]
    ZeroFailed(DeviceError),
}

/// Main error type for magctl-rs operations
#[derive(Error, Debug)]
pub enum MagCtlError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Routing error: {0}")]
    Compile(#[from] CompileError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Shutdown error: {0}")]
    Shutdown(#[from] ShutdownError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for magctl-rs operations
pub type Result<T> = std::result::Result<T, MagCtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MagCtlError::Config("period must be positive".to_string());
        assert_eq!(err.to_string(), "Configuration error: period must be positive");
    }

    #[test]
    fn test_invalid_value_error() {
        let err = DeviceError::InvalidValue {
            axis: 'y',
            value: f64::NAN,
        };
        assert!(err.to_string().contains("axis y"));
    }

    #[test]
    fn test_shutdown_error_wraps_device_error() {
        let err: MagCtlError =
            ShutdownError::ZeroFailed(DeviceError::Rejected("busy".to_string())).into();
        assert!(err.to_string().contains("busy"));
    }
}
