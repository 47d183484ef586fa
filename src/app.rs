//! Control panel: the process-wide owner of every component
//!
//! [`ControlPanel`] builds the actuator, the vision pipeline, the sampler and
//! the worker from an [`AppConfig`], dispatches [`PanelInput`] events, reacts
//! to worker events and tears everything down in order. Front ends (the
//! console in `main`, tests) talk to the subsystem only through it.

use crate::backend::{
    FieldActuator, FieldDevice, SessionId, SimulatedCoilDriver, WorkerController, WorkerEvent,
    WorkerState,
};
use crate::config::AppConfig;
use crate::error::{DeviceError, Result, ShutdownError};
use crate::routing::{CompileError, RoutingCompiler, RoutingPlan};
use crate::types::{Axis, FieldVector, Published};
use crate::vision::{
    FrameSource, SamplerStats, ScheduledSampler, SyntheticCamera, TickOutcome, VisionPipeline,
};
use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Typed input events from a front end
#[derive(Debug, Clone, PartialEq)]
pub enum PanelInput {
    SetFieldAxis(Axis, f64),
    SetField(FieldVector),
    ClearField,
    SetBypass(bool),
    SetUpdateEnabled(bool),
    SetObjectDetection(bool),
    /// Multi-line routing text, compiled line by line
    RefreshRouting(String),
    SetWorkerEnabled(bool),
    SetWorkerRateHz(f64),
    SetWorkerPeriodMs(u64),
}

/// Snapshot of the whole subsystem for display
#[derive(Debug, Clone)]
pub struct PanelStatus {
    pub worker_state: WorkerState,
    pub session: Option<SessionId>,
    pub period_ms: u64,
    pub target: FieldVector,
    pub applied: FieldVector,
    pub bypass_filters: bool,
    pub update_enabled: bool,
    pub object_detection: bool,
    pub plan_generation: u64,
    pub plan_stages: usize,
    pub last_frame: Option<u64>,
    pub last_detections: usize,
    pub sampler: SamplerStats,
    pub device_writes: u64,
    pub device_failures: u64,
    /// Percentage of device writes accepted
    pub device_success_rate: f64,
    pub avg_write_time_us: f64,
    /// Spread of recent write times
    pub write_jitter_us: u64,
    pub last_device_error: Option<DeviceError>,
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self
            .session
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            f,
            "worker:  {} (session {}, period {} ms)",
            self.worker_state, session, self.period_ms
        )?;
        writeln!(f, "field:   target {} applied {}", self.target, self.applied)?;
        writeln!(
            f,
            "vision:  capture {} bypass {} detect {} plan gen {} ({} stages)",
            on_off(self.update_enabled),
            on_off(self.bypass_filters),
            on_off(self.object_detection),
            self.plan_generation,
            self.plan_stages
        )?;
        match self.last_frame {
            Some(seq) => writeln!(
                f,
                "frame:   #{} with {} detections",
                seq, self.last_detections
            )?,
            None => writeln!(f, "frame:   none")?,
        }
        writeln!(
            f,
            "sampler: {} ticks, {} updates, {} skipped, {} capture failures",
            self.sampler.ticks,
            self.sampler.updates,
            self.sampler.skipped,
            self.sampler.capture_failures
        )?;
        write!(
            f,
            "device:  {} writes, {} failures ({:.1}% ok), avg {:.0} us, jitter {} us",
            self.device_writes,
            self.device_failures,
            self.device_success_rate,
            self.avg_write_time_us,
            self.write_jitter_us
        )?;
        if let Some(e) = &self.last_device_error {
            write!(f, "\n         last error: {}", e)?;
        }
        Ok(())
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Owns the actuator, vision pipeline, sampler and worker
pub struct ControlPanel {
    config: AppConfig,
    target: Arc<Published<FieldVector>>,
    actuator: Arc<FieldActuator>,
    vision: Arc<VisionPipeline>,
    sampler: ScheduledSampler,
    worker: WorkerController,
    shut_down: bool,
}

impl ControlPanel {
    /// Build every component from `config` around the given hardware
    pub fn new(
        config: AppConfig,
        device: Box<dyn FieldDevice>,
        source: Box<dyn FrameSource>,
    ) -> Self {
        let target = Arc::new(Published::new(FieldVector::ZERO));
        let actuator = Arc::new(FieldActuator::new(device, config.actuator.axis_limit));
        let vision = Arc::new(VisionPipeline::new(source, &config.vision));
        let sampler = ScheduledSampler::new(vision.clone(), config.sampler.interval());
        let worker = WorkerController::new(
            actuator.clone(),
            target.clone(),
            Some(vision.clone()),
            config.worker.clone(),
        );

        tracing::info!(
            "Control panel ready: device '{}', camera '{}'",
            actuator.device_name(),
            vision.source_name()
        );

        Self {
            config,
            target,
            actuator,
            vision,
            sampler,
            worker,
            shut_down: false,
        }
    }

    /// Panel on a simulated coil driver and synthetic camera
    pub fn with_simulated_hardware(config: AppConfig) -> Self {
        let camera = SyntheticCamera::new(config.camera.clone());
        Self::new(
            config,
            Box::new(SimulatedCoilDriver::new()),
            Box::new(camera),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn actuator(&self) -> &Arc<FieldActuator> {
        &self.actuator
    }

    pub fn vision(&self) -> &Arc<VisionPipeline> {
        &self.vision
    }

    pub fn sampler(&self) -> &ScheduledSampler {
        &self.sampler
    }

    pub fn worker(&self) -> &WorkerController {
        &self.worker
    }

    /// Published field target
    pub fn target(&self) -> FieldVector {
        *self.target.load()
    }

    /// Dispatch one input event
    pub fn handle(&mut self, input: PanelInput) -> Result<()> {
        tracing::debug!("Panel input: {:?}", input);
        match input {
            PanelInput::SetFieldAxis(axis, value) => {
                self.set_field_axis(axis, value)?;
            }
            PanelInput::SetField(vector) => {
                self.set_field(vector)?;
            }
            PanelInput::ClearField => self.clear_field()?,
            PanelInput::SetBypass(on) => self.vision.set_bypass(on),
            PanelInput::SetUpdateEnabled(on) => self.vision.set_update_enabled(on),
            PanelInput::SetObjectDetection(on) => self.vision.set_object_detection(on),
            PanelInput::RefreshRouting(text) => {
                self.refresh_routing(&text)?;
            }
            PanelInput::SetWorkerEnabled(true) => {
                self.worker.start()?;
            }
            PanelInput::SetWorkerEnabled(false) => {
                self.worker.stop();
            }
            PanelInput::SetWorkerRateHz(hz) => {
                self.worker.set_rate_hz(hz)?;
            }
            PanelInput::SetWorkerPeriodMs(period_ms) => self.worker.set_freq(period_ms)?,
        }
        Ok(())
    }

    /// Set one axis of the target and apply it right away.
    ///
    /// The new target is composed from the published one and published
    /// before the write, so a device fault leaves it in place for the
    /// worker's next iteration.
    pub fn set_field_axis(&self, axis: Axis, value: f64) -> std::result::Result<FieldVector, DeviceError> {
        self.actuator
            .publish_and_apply(&self.target, |t| t.with_axis(axis, value))
            .map_err(|e| {
                tracing::warn!("Failed to apply {} = {}: {}", axis, value, e);
                e
            })
    }

    /// Set all three axes and apply them right away
    pub fn set_field(&self, vector: FieldVector) -> std::result::Result<FieldVector, DeviceError> {
        self.actuator
            .publish_and_apply(&self.target, |_| vector)
            .map_err(|e| {
                tracing::warn!("Failed to apply field {}: {}", vector, e);
                e
            })
    }

    /// Reset the target to zero and zero the device
    pub fn clear_field(&self) -> std::result::Result<(), DeviceError> {
        self.actuator
            .publish_and_apply(&self.target, |_| FieldVector::ZERO)
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!("Failed to zero field: {}", e);
                e
            })
    }

    /// Compile routing text and swap it in; the active plan is kept on error.
    ///
    /// Returns the new plan generation.
    pub fn refresh_routing(&self, text: &str) -> std::result::Result<u64, CompileError> {
        match RoutingCompiler::compile(text.lines()) {
            Ok(plan) => Ok(self.vision.swap_plan(plan)),
            Err(e) => {
                tracing::warn!("Routing not updated: {}", e);
                Err(e)
            }
        }
    }

    /// Active routing plan
    pub fn plan(&self) -> Arc<RoutingPlan> {
        self.vision.plan()
    }

    /// Tick channel for the foreground loop
    pub fn sampler_ticker(&self) -> Receiver<std::time::Instant> {
        self.sampler.ticker()
    }

    /// Handle one sampler tick
    pub fn tick_sampler(&self, now: Instant) -> TickOutcome {
        self.sampler.fire(now)
    }

    /// Receiver of worker events, for selecting on
    pub fn worker_events(&self) -> Receiver<WorkerEvent> {
        self.worker.events().clone()
    }

    /// Drain and handle every pending worker event
    pub fn poll_worker_events(&mut self) -> Vec<WorkerEvent> {
        let events: Vec<_> = self.worker.events().try_iter().collect();
        for event in &events {
            self.handle_worker_event(event);
        }
        events
    }

    /// React to one worker event
    pub fn handle_worker_event(&mut self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Started { session } => {
                tracing::info!("Worker session {} started", session);
            }
            WorkerEvent::Status { session, message } => {
                tracing::info!("Worker session {}: {}", session, message);
            }
            WorkerEvent::VisionSample {
                session,
                sequence,
                detections,
            } => {
                tracing::debug!(
                    "Worker session {} sampled frame {} ({} detections)",
                    session,
                    sequence,
                    detections.len()
                );
            }
            WorkerEvent::Finished {
                session,
                iterations,
                zeroed,
            } => {
                if *zeroed {
                    tracing::info!(
                        "Worker session {} finished after {} iterations",
                        session,
                        iterations
                    );
                } else {
                    tracing::error!(
                        "Worker session {} finished without zeroing the field",
                        session
                    );
                }
                // A newer session owns the target once it has started
                if self.worker.session_id() != Some(*session) {
                    tracing::debug!("Ignoring finish of superseded session {}", session);
                    return;
                }
                // The worker is gone, so the target goes back to zero as well
                if let Err(e) = self.clear_field() {
                    tracing::error!("Could not clear field after session {}: {}", session, e);
                }
            }
        }
    }

    pub fn status(&self) -> PanelStatus {
        let vision = self.vision.state();
        let frame = self.vision.latest_frame();
        let device = self.actuator.stats();
        PanelStatus {
            worker_state: self.worker.state(),
            session: self.worker.session_id(),
            period_ms: self.worker.period_ms(),
            target: self.target(),
            applied: self.actuator.applied(),
            bypass_filters: vision.bypass_filters,
            update_enabled: vision.update_enabled,
            object_detection: vision.object_detection_enabled,
            plan_generation: vision.plan_generation,
            plan_stages: vision.plan.len(),
            last_frame: frame.as_ref().map(|f| f.sequence),
            last_detections: frame.as_ref().map_or(0, |f| f.detections.len()),
            sampler: self.sampler.stats(),
            device_writes: device.successful_writes,
            device_failures: device.failed_writes,
            device_success_rate: device.success_rate(),
            avg_write_time_us: device.avg_write_time_us(),
            write_jitter_us: device.jitter_us(),
            last_device_error: device.last_error.clone(),
        }
    }

    /// Stop the worker, then zero the actuator.
    ///
    /// Safe to call more than once. Failures are logged at error level
    /// because the field may still be live.
    pub fn shutdown(&mut self) -> std::result::Result<(), ShutdownError> {
        if self.shut_down {
            return Ok(());
        }
        tracing::info!("Shutting down control panel");

        let worker_result = self.worker.shutdown(self.config.worker.shutdown_timeout());
        self.poll_worker_events();

        self.target.store(FieldVector::ZERO);
        let zero_result = self
            .actuator
            .zero_with_retries(self.config.worker.zero_attempts);

        self.shut_down = true;
        match (worker_result, zero_result) {
            (Err(e), _) => {
                tracing::error!("Worker shutdown failed: {}", e);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                tracing::error!("Final zeroing failed, field may be live: {}", e);
                Err(ShutdownError::ZeroFailed(e))
            }
            (Ok(()), Ok(())) => {
                tracing::info!("Control panel shut down, field zeroed");
                Ok(())
            }
        }
    }
}

impl Drop for ControlPanel {
    fn drop(&mut self) {
        // Errors are already logged
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CoilMonitor, SimulatedCoilDriver};
    use crate::error::{ControlError, MagCtlError};
    use crate::vision::CameraControl;
    use std::time::Duration;

    fn create_test_panel() -> (ControlPanel, CoilMonitor, CameraControl) {
        let mut config = AppConfig::default();
        config.camera.width = 32;
        config.camera.height = 24;
        config.camera.object_radius = 3;
        config.worker.period_ms = 10;
        let driver = SimulatedCoilDriver::new();
        let monitor = driver.monitor();
        let camera = SyntheticCamera::new(config.camera.clone());
        let control = camera.control();
        (
            ControlPanel::new(config, Box::new(driver), Box::new(camera)),
            monitor,
            control,
        )
    }

    #[test]
    fn test_field_inputs_publish_and_apply() {
        let (mut panel, monitor, _) = create_test_panel();

        panel.handle(PanelInput::SetFieldAxis(Axis::X, 1.5)).unwrap();
        panel.handle(PanelInput::SetFieldAxis(Axis::Z, -0.5)).unwrap();
        assert_eq!(panel.target(), FieldVector::new(1.5, 0.0, -0.5));
        assert_eq!(monitor.last(), Some(FieldVector::new(1.5, 0.0, -0.5)));

        panel.handle(PanelInput::ClearField).unwrap();
        assert_eq!(panel.target(), FieldVector::ZERO);
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));
    }

    #[test]
    fn test_device_fault_keeps_target() {
        let (panel, monitor, _) = create_test_panel();
        monitor.set_connected(false);

        assert!(panel.set_field(FieldVector::new(1.0, 2.0, 3.0)).is_err());
        assert_eq!(panel.target(), FieldVector::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_status_reports_device_health() {
        let (panel, monitor, _) = create_test_panel();
        panel.set_field(FieldVector::new(1.0, 0.0, 0.0)).unwrap();
        monitor.fail_next(1);
        assert!(panel.set_field(FieldVector::new(2.0, 0.0, 0.0)).is_err());

        let status = panel.status();
        assert_eq!(status.device_writes, 1);
        assert_eq!(status.device_failures, 1);
        assert!((status.device_success_rate - 50.0).abs() < f64::EPSILON);
        assert!(matches!(
            status.last_device_error,
            Some(DeviceError::Rejected(_))
        ));

        let text = status.to_string();
        assert!(text.contains("(50.0% ok)"), "{}", text);
        assert!(text.contains("last error: Device rejected write"), "{}", text);
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let (mut panel, monitor, _) = create_test_panel();
        let err = panel
            .handle(PanelInput::SetFieldAxis(Axis::Y, f64::NAN))
            .unwrap_err();

        assert!(matches!(err, MagCtlError::Device(DeviceError::InvalidValue { .. })));
        assert_eq!(panel.target(), FieldVector::ZERO);
        assert_eq!(monitor.write_count(), 0);
    }

    #[test]
    fn test_refresh_routing_keeps_plan_on_error() {
        let (mut panel, _, _) = create_test_panel();

        panel
            .handle(PanelInput::RefreshRouting("lowpass 3\nthreshold 100".into()))
            .unwrap();
        let active = panel.plan();
        assert_eq!(active.len(), 2);

        let err = panel.refresh_routing("lowpass 3\nunknownStage").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(*panel.plan(), *active);
        assert_eq!(panel.status().plan_generation, 1);
    }

    #[test]
    fn test_vision_toggles() {
        let (mut panel, _, control) = create_test_panel();

        panel.handle(PanelInput::SetUpdateEnabled(false)).unwrap();
        panel.tick_sampler(Instant::now());
        assert_eq!(control.captures(), 0);

        panel.handle(PanelInput::SetUpdateEnabled(true)).unwrap();
        panel.handle(PanelInput::SetObjectDetection(true)).unwrap();
        panel.handle(PanelInput::SetBypass(true)).unwrap();
        panel.tick_sampler(Instant::now());

        let status = panel.status();
        assert!(status.bypass_filters && status.object_detection);
        assert_eq!(status.last_frame, Some(1));
        assert_eq!(status.last_detections, 1);
    }

    #[test]
    fn test_worker_rate_inputs() {
        let (mut panel, _, _) = create_test_panel();

        panel.handle(PanelInput::SetWorkerRateHz(20.0)).unwrap();
        assert_eq!(panel.worker().period_ms(), 50);
        panel.handle(PanelInput::SetWorkerPeriodMs(30)).unwrap();
        assert_eq!(panel.worker().period_ms(), 30);

        let err = panel.handle(PanelInput::SetWorkerRateHz(0.0)).unwrap_err();
        assert!(matches!(err, MagCtlError::Control(ControlError::InvalidFrequency)));
    }

    #[test]
    fn test_finished_session_clears_target() {
        let (mut panel, monitor, _) = create_test_panel();
        panel.set_field(FieldVector::new(0.5, 0.5, 0.5)).unwrap();

        panel.handle(PanelInput::SetWorkerEnabled(true)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while monitor.write_count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        panel.handle(PanelInput::SetWorkerEnabled(false)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut finished = false;
        while !finished && Instant::now() < deadline {
            finished = panel
                .poll_worker_events()
                .iter()
                .any(|e| matches!(e, WorkerEvent::Finished { zeroed: true, .. }));
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(finished);
        assert_eq!(panel.target(), FieldVector::ZERO);
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));
    }

    #[test]
    fn test_finish_of_old_session_keeps_new_target() {
        let (mut panel, monitor, _) = create_test_panel();

        let first = panel.worker.start().unwrap();
        panel.worker.stop();
        let deadline = Instant::now() + Duration::from_secs(2);
        while panel.worker().state() != WorkerState::Stopped && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        // Restart before the first session's events are handled
        let second = panel.worker.start().unwrap();
        panel.set_field(FieldVector::new(0.25, 0.5, 0.75)).unwrap();

        let events = panel.poll_worker_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::Finished { session, .. } if *session == first)));
        assert_eq!(panel.worker().session_id(), Some(second));
        assert_eq!(panel.target(), FieldVector::new(0.25, 0.5, 0.75));

        panel.shutdown().unwrap();
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));
    }

    #[test]
    fn test_field_writes_race_worker_without_going_stale() {
        let (mut panel, monitor, _) = create_test_panel();
        monitor.set_write_delay(Duration::from_millis(8));
        panel.handle(PanelInput::SetWorkerPeriodMs(12)).unwrap();
        panel.handle(PanelInput::SetWorkerEnabled(true)).unwrap();

        for i in 0..10 {
            let v = i as f64;
            panel.set_field(FieldVector::new(v, v, v)).unwrap();
            panel.set_field(FieldVector::new(v + 0.5, v + 0.5, v + 0.5)).unwrap();
            // Device calls are serialized, so the latest write matches the target
            assert_eq!(monitor.last(), Some(panel.target()));
            std::thread::sleep(Duration::from_millis(10));
            assert_eq!(monitor.last(), Some(panel.target()));
        }

        panel.shutdown().unwrap();
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));
    }

    #[test]
    fn test_shutdown_zeroes_and_is_idempotent() {
        let (mut panel, monitor, _) = create_test_panel();
        panel.set_field(FieldVector::new(1.0, 1.0, 1.0)).unwrap();
        panel.handle(PanelInput::SetWorkerEnabled(true)).unwrap();

        panel.shutdown().unwrap();
        assert_eq!(panel.worker().state(), WorkerState::Stopped);
        assert_eq!(monitor.last(), Some(FieldVector::ZERO));

        let writes = monitor.write_count();
        panel.shutdown().unwrap();
        assert_eq!(monitor.write_count(), writes);
    }
}
