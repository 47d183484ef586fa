//! Vision pipeline: capture, routing plan, detection, publication
//!
//! [`VisionPipeline::update`] is the composite operation the sampler ticks.
//! Toggles and the routing plan live in one immutable [`VisionState`] that
//! is swapped whole, and each update works on the snapshot it read first,
//! so a concurrent toggle or plan swap lands on the next update.
//!
//! The frame source sits behind its own mutex. No published value is
//! locked while a capture or a stage is running.

use super::detector::{detect_objects, DetectorParams};
use super::frame::{Frame, ProcessedFrame};
use super::source::FrameSource;
use super::stages::apply_plan;
use crate::config::VisionSettings;
use crate::error::CaptureError;
use crate::routing::RoutingPlan;
use crate::types::Published;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Toggles and routing plan, published as one value
#[derive(Debug, Clone, PartialEq)]
pub struct VisionState {
    pub bypass_filters: bool,
    pub update_enabled: bool,
    pub object_detection_enabled: bool,
    pub plan: Arc<RoutingPlan>,
    /// Incremented on every plan swap
    pub plan_generation: u64,
}

impl Default for VisionState {
    fn default() -> Self {
        Self {
            bypass_filters: false,
            update_enabled: true,
            object_detection_enabled: false,
            plan: Arc::new(RoutingPlan::new()),
            plan_generation: 0,
        }
    }
}

/// Result of one [`VisionPipeline::update`] call
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Updates are switched off
    Disabled,
    /// A recent capture failed and the retry window has not elapsed
    BackingOff,
    /// A new frame was processed and published
    Processed(Arc<ProcessedFrame>),
}

/// Exponential retry window after capture failures
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
    until: Option<Instant>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: None,
            until: None,
        }
    }

    /// Whether a capture may be attempted at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.until.map_or(true, |until| now >= until)
    }

    /// Arm (or lengthen) the window after a failure; returns its length
    pub fn fail(&mut self, now: Instant) -> Duration {
        let next = match self.current {
            None => self.min,
            Some(d) => (d * 2).min(self.max),
        };
        self.current = Some(next);
        self.until = Some(now + next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.until = None;
    }

    /// Length of the active window, if any
    pub fn current(&self) -> Option<Duration> {
        self.current
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Default)]
pub struct VisionStats {
    pub captures: u64,
    pub capture_failures: u64,
    pub frames_processed: u64,
    pub last_processing_time_us: u64,
    pub last_error: Option<CaptureError>,
}

/// Camera capture plus routing plan plus object detection
pub struct VisionPipeline {
    source: Mutex<Box<dyn FrameSource>>,
    source_name: String,
    state: Published<VisionState>,
    latest: Published<Option<Arc<ProcessedFrame>>>,
    backoff: Mutex<Backoff>,
    stats: Mutex<VisionStats>,
    detector: DetectorParams,
    sequence: AtomicU64,
}

impl VisionPipeline {
    pub fn new(source: Box<dyn FrameSource>, settings: &VisionSettings) -> Self {
        let source_name = source.name();
        let state = VisionState {
            bypass_filters: settings.bypass_filters,
            update_enabled: settings.update_enabled,
            object_detection_enabled: settings.object_detection,
            ..VisionState::default()
        };
        Self {
            source: Mutex::new(source),
            source_name,
            state: Published::new(state),
            latest: Published::new(None),
            backoff: Mutex::new(Backoff::new(
                Duration::from_millis(settings.backoff_min_ms),
                Duration::from_millis(settings.backoff_max_ms),
            )),
            stats: Mutex::new(VisionStats::default()),
            detector: DetectorParams::from(settings),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Current toggles and plan
    pub fn state(&self) -> Arc<VisionState> {
        self.state.load()
    }

    pub fn plan(&self) -> Arc<RoutingPlan> {
        self.state.load().plan.clone()
    }

    /// Last published frame
    pub fn latest_frame(&self) -> Option<Arc<ProcessedFrame>> {
        (*self.latest.load()).clone()
    }

    pub fn stats(&self) -> VisionStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.state.update(|s| VisionState {
            bypass_filters: bypass,
            ..s.clone()
        });
        tracing::info!("Filter bypass {}", on_off(bypass));
    }

    pub fn set_update_enabled(&self, enabled: bool) {
        self.state.update(|s| VisionState {
            update_enabled: enabled,
            ..s.clone()
        });
        tracing::info!("Frame updates {}", on_off(enabled));
    }

    pub fn set_object_detection(&self, enabled: bool) {
        self.state.update(|s| VisionState {
            object_detection_enabled: enabled,
            ..s.clone()
        });
        tracing::info!("Object detection {}", on_off(enabled));
    }

    /// Replace the routing plan; returns the new plan generation
    pub fn swap_plan(&self, plan: RoutingPlan) -> u64 {
        let plan = Arc::new(plan);
        let stages = plan.len();
        let next = self.state.update(|s| VisionState {
            plan: plan.clone(),
            plan_generation: s.plan_generation + 1,
            ..s.clone()
        });
        tracing::info!(
            "Routing plan generation {} active ({} stages)",
            next.plan_generation,
            stages
        );
        next.plan_generation
    }

    /// Grab one raw frame from the source
    pub fn capture_frame(&self) -> Result<Frame, CaptureError> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        source.capture()
    }

    /// Run a frame through every stage of `plan`
    pub fn apply_pipeline(&self, frame: Frame, plan: &RoutingPlan) -> Frame {
        apply_plan(frame, plan)
    }

    /// One full update: capture, filter, detect, publish.
    ///
    /// # Errors
    /// The capture error; a retry window is armed before returning it.
    pub fn update(&self) -> Result<UpdateOutcome, CaptureError> {
        let snapshot = self.state.load();
        if !snapshot.update_enabled {
            return Ok(UpdateOutcome::Disabled);
        }

        if !self.lock_backoff().ready(Instant::now()) {
            return Ok(UpdateOutcome::BackingOff);
        }

        let frame = match self.capture_frame() {
            Ok(frame) => {
                self.lock_backoff().reset();
                frame
            }
            Err(e) => {
                let window = self.lock_backoff().fail(Instant::now());
                tracing::warn!(
                    "Capture from {} failed: {}; retrying in {:?}",
                    self.source_name,
                    e,
                    window
                );
                let mut stats = self.lock_stats();
                stats.captures += 1;
                stats.capture_failures += 1;
                stats.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let captured_at = chrono::Utc::now();
        let start = Instant::now();

        let filtered = !snapshot.bypass_filters;
        let image = if filtered {
            self.apply_pipeline(frame, &snapshot.plan)
        } else {
            frame
        };

        let detections = if snapshot.object_detection_enabled {
            detect_objects(&image, &self.detector)
        } else {
            Vec::new()
        };

        let processed = Arc::new(ProcessedFrame {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            captured_at,
            image,
            detections,
            filtered,
            plan_generation: snapshot.plan_generation,
        });
        self.latest.store(Some(processed.clone()));

        {
            let mut stats = self.lock_stats();
            stats.captures += 1;
            stats.frames_processed += 1;
            stats.last_processing_time_us = start.elapsed().as_micros() as u64;
        }
        tracing::trace!(
            "Frame {} processed with {} detections",
            processed.sequence,
            processed.detections.len()
        );

        Ok(UpdateOutcome::Processed(processed))
    }

    fn lock_backoff(&self) -> std::sync::MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, VisionStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for VisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionPipeline")
            .field("source", &self.source_name)
            .field("state", &self.state.load())
            .finish()
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
