//! Actuation backend: the coil device, the field actuator and the worker
//!
//! # Components
//!
//! - [`FieldDevice`] - Opaque hardware channel accepting full field vectors
//! - [`SimulatedCoilDriver`] - In-process device for running without hardware
//! - [`FieldActuator`] - Full-vector writes with clamping and statistics
//! - [`WorkerController`] - Periodic background application of the target
//!
//! # Example
//!
//! ```ignore
//! use magctl_rs::backend::{FieldActuator, SimulatedCoilDriver, WorkerController};
//! use magctl_rs::config::WorkerSettings;
//! use magctl_rs::types::{FieldVector, Published};
//! use std::sync::Arc;
//!
//! let actuator = Arc::new(FieldActuator::new(Box::new(SimulatedCoilDriver::new()), None));
//! let target = Arc::new(Published::new(FieldVector::new(0.5, 0.0, 0.0)));
//! let mut worker = WorkerController::new(actuator, target, None, WorkerSettings::default());
//!
//! worker.start()?;
//! // ...
//! worker.shutdown(std::time::Duration::from_secs(2))?;
//! ```

pub mod actuator;
pub mod device_trait;
pub mod mock_device;
pub mod worker;

pub use actuator::FieldActuator;
pub use device_trait::{ActuatorStats, FieldDevice};
pub use mock_device::{CoilMonitor, CoilWrite, SimulatedCoilDriver};
pub use worker::{rate_to_period_ms, SessionId, WorkerController, WorkerEvent, WorkerState};
