//! Hand-written test doubles for the hardware traits

use magctl_rs::backend::FieldDevice;
use magctl_rs::error::{CaptureError, DeviceError};
use magctl_rs::types::FieldVector;
use magctl_rs::vision::{Frame, FrameSource};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Coil device that panics on a chosen non-zero write
pub struct PanickingCoil {
    pub panic_on_write: usize,
    writes: usize,
    pub log: Arc<Mutex<Vec<FieldVector>>>,
}

impl PanickingCoil {
    pub fn new(panic_on_write: usize) -> Self {
        Self {
            panic_on_write,
            writes: 0,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FieldDevice for PanickingCoil {
    fn write_vector(&mut self, vector: FieldVector) -> Result<(), DeviceError> {
        if !vector.is_zero() {
            self.writes += 1;
            if self.writes == self.panic_on_write {
                panic!("coil driver crashed on write {}", self.writes);
            }
        }
        self.log.lock().unwrap().push(vector);
        Ok(())
    }

    fn name(&self) -> String {
        "panicking coil".to_string()
    }
}

/// Shared counters of a [`GatedCamera`]
#[derive(Debug, Default)]
pub struct GateStats {
    pub in_capture: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    pub captures: AtomicUsize,
}

/// Camera whose captures block until the test opens the gate
pub struct GatedCamera {
    gate: Receiver<()>,
    stats: Arc<GateStats>,
}

impl GatedCamera {
    /// Returns the camera, the gate (one send releases one capture) and its stats
    pub fn new() -> (Self, Sender<()>, Arc<GateStats>) {
        let (tx, rx) = bounded(16);
        let stats = Arc::new(GateStats::default());
        (
            Self {
                gate: rx,
                stats: stats.clone(),
            },
            tx,
            stats,
        )
    }
}

impl FrameSource for GatedCamera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let now = self.stats.in_capture.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let result = self
            .gate
            .recv()
            .map(|_| Frame::new(8, 8))
            .map_err(|_| CaptureError::Unavailable("gate closed".to_string()));

        self.stats.captures.fetch_add(1, Ordering::SeqCst);
        self.stats.in_capture.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> String {
        "gated camera".to_string()
    }
}
