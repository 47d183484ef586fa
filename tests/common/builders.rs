//! Test rig builders

use magctl_rs::backend::{CoilMonitor, FieldActuator, SimulatedCoilDriver, WorkerController};
use magctl_rs::config::{CameraSettings, VisionSettings, WorkerSettings};
use magctl_rs::types::{FieldVector, Published};
use magctl_rs::vision::{CameraControl, SyntheticCamera, VisionPipeline};
use std::sync::Arc;

/// A worker controller wired to a simulated coil driver
pub struct WorkerRig {
    pub controller: WorkerController,
    pub monitor: CoilMonitor,
    pub actuator: Arc<FieldActuator>,
    pub target: Arc<Published<FieldVector>>,
}

/// Builder for [`WorkerRig`]s
pub struct WorkerRigBuilder {
    settings: WorkerSettings,
    target: FieldVector,
    axis_limit: Option<f64>,
    vision: Option<Arc<VisionPipeline>>,
}

impl WorkerRigBuilder {
    pub fn new() -> Self {
        Self {
            settings: WorkerSettings::default(),
            target: FieldVector::new(1.0, -1.0, 0.5),
            axis_limit: None,
            vision: None,
        }
    }

    pub fn period_ms(mut self, period_ms: u64) -> Self {
        self.settings.period_ms = period_ms;
        self
    }

    pub fn target(mut self, target: FieldVector) -> Self {
        self.target = target;
        self
    }

    pub fn axis_limit(mut self, limit: f64) -> Self {
        self.axis_limit = Some(limit);
        self
    }

    pub fn vision(mut self, vision: Arc<VisionPipeline>) -> Self {
        self.settings.sample_vision = true;
        self.vision = Some(vision);
        self
    }

    pub fn build(self) -> WorkerRig {
        let driver = SimulatedCoilDriver::new();
        let monitor = driver.monitor();
        self.build_with(Box::new(driver), monitor)
    }

    /// Build around a custom device; `monitor` is handed back untouched
    pub fn build_with(
        self,
        device: Box<dyn magctl_rs::backend::FieldDevice>,
        monitor: CoilMonitor,
    ) -> WorkerRig {
        let actuator = Arc::new(FieldActuator::new(device, self.axis_limit));
        let target = Arc::new(Published::new(self.target));
        let controller =
            WorkerController::new(actuator.clone(), target.clone(), self.vision, self.settings);
        WorkerRig {
            controller,
            monitor,
            actuator,
            target,
        }
    }
}

/// Small synthetic camera settings for fast tests
pub fn small_camera() -> CameraSettings {
    CameraSettings {
        width: 32,
        height: 24,
        object_radius: 3,
    }
}

/// Vision pipeline on a small synthetic camera
pub fn synthetic_pipeline(settings: VisionSettings) -> (Arc<VisionPipeline>, CameraControl) {
    let camera = SyntheticCamera::new(small_camera());
    let control = camera.control();
    (
        Arc::new(VisionPipeline::new(Box::new(camera), &settings)),
        control,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_rig_builder() {
        let rig = WorkerRigBuilder::new()
            .period_ms(25)
            .target(FieldVector::new(1.0, 2.0, 3.0))
            .build();

        assert_eq!(rig.controller.period_ms(), 25);
        assert_eq!(*rig.target.load(), FieldVector::new(1.0, 2.0, 3.0));
        assert_eq!(rig.monitor.write_count(), 0);
    }
}
