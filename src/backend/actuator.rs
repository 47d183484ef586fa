//! Field actuator: the only path from the control model to the coil device
//!
//! [`FieldActuator::set_vector`] and [`FieldActuator::zero`] are the only
//! operations that reach the device, and they always send all three axes.
//! Single-axis updates are composed with the last requested values of the
//! other two axes first, so the device never sees a partial command.
//!
//! The device sits behind the actuator's own mutex, which serializes the
//! hardware channel between the foreground and the worker. Writes that
//! follow a [`Published`] target read it while holding that mutex, so an
//! older snapshot can never be written over a newer one. The published slot
//! itself is never held across a device write.

use super::device_trait::{ActuatorStats, FieldDevice};
use crate::error::DeviceError;
use crate::types::{Axis, FieldVector, Published};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

struct ActuatorInner {
    device: Box<dyn FieldDevice>,
    /// Last vector asked for, used to compose single-axis updates
    requested: FieldVector,
    /// Last vector the device accepted
    applied: FieldVector,
    stats: ActuatorStats,
}

/// Wraps a [`FieldDevice`] with full-vector semantics and optional clamping
pub struct FieldActuator {
    inner: Mutex<ActuatorInner>,
    axis_limit: Option<f64>,
    device_name: String,
}

impl FieldActuator {
    /// Create an actuator; `axis_limit` clamps each axis to `[-limit, limit]`
    pub fn new(device: Box<dyn FieldDevice>, axis_limit: Option<f64>) -> Self {
        let device_name = device.name();
        Self {
            inner: Mutex::new(ActuatorInner {
                device,
                requested: FieldVector::ZERO,
                applied: FieldVector::ZERO,
                stats: ActuatorStats::default(),
            }),
            axis_limit,
            device_name,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActuatorInner> {
        // A panic inside a device write leaves the bookkeeping consistent,
        // and the terminal zeroing must still be able to reach the device.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Set one axis, keeping the last requested values of the other two.
    ///
    /// Returns the vector sent to the device.
    pub fn set_axis(&self, axis: Axis, value: f64) -> Result<FieldVector, DeviceError> {
        let mut inner = self.lock();
        let vector = inner.requested.with_axis(axis, value);
        self.write_locked(&mut inner, vector)
    }

    /// Command all three axes at once.
    ///
    /// Returns the vector sent to the device (after clamping).
    pub fn set_vector(&self, vector: FieldVector) -> Result<FieldVector, DeviceError> {
        let mut inner = self.lock();
        self.write_locked(&mut inner, vector)
    }

    /// Apply the current value of a published target.
    ///
    /// The snapshot is taken under the device lock, so a concurrent
    /// [`FieldActuator::publish_and_apply`] is either fully before or fully
    /// after this write.
    pub fn apply_published(
        &self,
        target: &Published<FieldVector>,
    ) -> Result<FieldVector, DeviceError> {
        let mut inner = self.lock();
        let vector = *target.load();
        self.write_locked(&mut inner, vector)
    }

    /// Build the next target from the published one, publish it and apply it
    /// as one step.
    ///
    /// A non-finite result is rejected before anything is published. The
    /// target stays published when the device write fails.
    pub fn publish_and_apply<F>(
        &self,
        target: &Published<FieldVector>,
        f: F,
    ) -> Result<FieldVector, DeviceError>
    where
        F: FnOnce(FieldVector) -> FieldVector,
    {
        let mut inner = self.lock();
        let next = f(*target.load());
        if let Some((axis, value)) = next.first_non_finite() {
            return Err(DeviceError::InvalidValue {
                axis: axis.letter(),
                value,
            });
        }
        target.store(next);
        self.write_locked(&mut inner, next)
    }

    /// Command the safe all-zero vector
    pub fn zero(&self) -> Result<(), DeviceError> {
        self.set_vector(FieldVector::ZERO).map(|_| ())
    }

    /// Zero the field, retrying a failed write up to `attempts` times in total
    pub fn zero_with_retries(&self, attempts: u32) -> Result<(), DeviceError> {
        let attempts = attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.zero() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Zeroing attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| DeviceError::Rejected("zeroing failed".to_string())))
    }

    /// Last vector requested through this actuator
    pub fn requested(&self) -> FieldVector {
        self.lock().requested
    }

    /// Last vector the device accepted
    pub fn applied(&self) -> FieldVector {
        self.lock().applied
    }

    pub fn stats(&self) -> ActuatorStats {
        self.lock().stats.clone()
    }

    fn write_locked(
        &self,
        inner: &mut ActuatorInner,
        vector: FieldVector,
    ) -> Result<FieldVector, DeviceError> {
        if let Some((axis, value)) = vector.first_non_finite() {
            let err = DeviceError::InvalidValue {
                axis: axis.letter(),
                value,
            };
            inner.stats.record_failure(err.clone());
            return Err(err);
        }

        inner.requested = vector;
        let command = match self.axis_limit {
            Some(limit) => vector.clamped(limit),
            None => vector,
        };
        if command != vector {
            tracing::debug!("Clamped field command {} to {}", vector, command);
        }

        let start = Instant::now();
        match inner.device.write_vector(command) {
            Ok(()) => {
                inner.applied = command;
                inner
                    .stats
                    .record_success(start.elapsed().as_micros() as u64);
                tracing::trace!("Applied field {}", command);
                Ok(command)
            }
            Err(e) => {
                inner.stats.record_failure(e.clone());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for FieldActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldActuator")
            .field("device", &self.device_name)
            .field("axis_limit", &self.axis_limit)
            .finish()
    }
}
