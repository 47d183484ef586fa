//! Simulated coil driver
//!
//! Stands in for the coil board when no hardware is attached. Every write is
//! logged with its timestamp, and faults can be injected, so the worker's
//! timing and safety behavior can be observed from tests.
//!
//! # Example
//!
//! ```ignore
//! use magctl_rs::backend::{FieldActuator, SimulatedCoilDriver};
//!
//! let driver = SimulatedCoilDriver::new();
//! let monitor = driver.monitor();
//! let actuator = FieldActuator::new(Box::new(driver), None);
//!
//! monitor.fail_next(1);
//! assert!(actuator.zero().is_err());
//! assert!(actuator.zero().is_ok());
//! assert_eq!(monitor.last(), Some(FieldVector::ZERO));
//! ```

use super::device_trait::FieldDevice;
use crate::error::DeviceError;
use crate::types::FieldVector;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One accepted write
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoilWrite {
    pub at: Instant,
    pub vector: FieldVector,
}

#[derive(Debug, Default)]
struct CoilLog {
    writes: Vec<CoilWrite>,
    attempts: u64,
    fail_next: u32,
    disconnected: bool,
    write_delay: Duration,
}

/// Inspection and fault-injection handle for a [`SimulatedCoilDriver`]
#[derive(Debug, Clone, Default)]
pub struct CoilMonitor {
    log: Arc<Mutex<CoilLog>>,
}

impl CoilMonitor {
    fn with_log<R>(&self, f: impl FnOnce(&mut CoilLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    /// All accepted writes, oldest first
    pub fn writes(&self) -> Vec<CoilWrite> {
        self.with_log(|log| log.writes.clone())
    }

    /// Accepted vectors, oldest first
    pub fn vectors(&self) -> Vec<FieldVector> {
        self.with_log(|log| log.writes.iter().map(|w| w.vector).collect())
    }

    /// Vector currently held by the simulated coils
    pub fn last(&self) -> Option<FieldVector> {
        self.with_log(|log| log.writes.last().map(|w| w.vector))
    }

    pub fn write_count(&self) -> usize {
        self.with_log(|log| log.writes.len())
    }

    /// Writes attempted, including rejected ones
    pub fn attempts(&self) -> u64 {
        self.with_log(|log| log.attempts)
    }

    /// Reject the next `count` writes
    pub fn fail_next(&self, count: u32) {
        self.with_log(|log| log.fail_next = count);
    }

    /// Simulate unplugging (or replugging) the board
    pub fn set_connected(&self, connected: bool) {
        self.with_log(|log| log.disconnected = !connected);
    }

    /// Time each write takes
    pub fn set_write_delay(&self, delay: Duration) {
        self.with_log(|log| log.write_delay = delay);
    }
}

/// Coil driver that records writes instead of driving current
#[derive(Debug, Default)]
pub struct SimulatedCoilDriver {
    monitor: CoilMonitor,
}

impl SimulatedCoilDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this driver's log
    pub fn monitor(&self) -> CoilMonitor {
        self.monitor.clone()
    }
}

impl FieldDevice for SimulatedCoilDriver {
    fn write_vector(&mut self, vector: FieldVector) -> Result<(), DeviceError> {
        let delay = self.monitor.with_log(|log| {
            log.attempts += 1;
            log.write_delay
        });
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.monitor.with_log(|log| {
            if log.disconnected {
                return Err(DeviceError::Unavailable(
                    "simulated coil board disconnected".to_string(),
                ));
            }
            if log.fail_next > 0 {
                log.fail_next -= 1;
                return Err(DeviceError::Rejected("injected fault".to_string()));
            }
            log.writes.push(CoilWrite {
                at: Instant::now(),
                vector,
            });
            Ok(())
        })
    }

    fn name(&self) -> String {
        "simulated coil driver".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes() {
        let mut driver = SimulatedCoilDriver::new();
        let monitor = driver.monitor();

        driver.write_vector(FieldVector::new(1.0, 2.0, 3.0)).unwrap();
        driver.write_vector(FieldVector::ZERO).unwrap();

        assert_eq!(
            monitor.vectors(),
            vec![FieldVector::new(1.0, 2.0, 3.0), FieldVector::ZERO]
        );
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));
    }

    #[test]
    fn test_fault_injection() {
        let mut driver = SimulatedCoilDriver::new();
        let monitor = driver.monitor();

        monitor.fail_next(2);
        assert!(driver.write_vector(FieldVector::ZERO).is_err());
        assert!(driver.write_vector(FieldVector::ZERO).is_err());
        assert!(driver.write_vector(FieldVector::ZERO).is_ok());
        assert_eq!(monitor.attempts(), 3);
        assert_eq!(monitor.write_count(), 1);

        monitor.set_connected(false);
        assert!(matches!(
            driver.write_vector(FieldVector::ZERO),
            Err(DeviceError::Unavailable(_))
        ));
    }
}
