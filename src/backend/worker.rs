//! Background Worker Implementation
//!
//! The worker applies the published field target to the actuator at a
//! configurable period, in its own thread, one session at a time. The
//! foreground owns a [`WorkerController`] and only requests transitions;
//! the state machine itself is advanced by the worker thread.
//!
//! # State Machine
//!
//! ```text
//! Stopped --start()--> Starting --(thread up)--> Running
//!    ^                    |                         |
//!    |                 stop()                    stop()
//!    |                    v                         v
//!    +--(zeroed)------ Stopping <-------------------+
//! ```
//!
//! # Loop
//!
//! Each iteration checks for cancellation, applies the current target with
//! one full-vector write, optionally samples the latest processed frame,
//! then waits for the period or a cancel wake-up, whichever comes first.
//! Cancellation is only observed at the top of an iteration, so a write is
//! never interrupted.
//!
//! # Termination
//!
//! The terminal sequence (zero the actuator, publish `Stopped`, emit
//! `Finished`) runs from a drop guard owned by the worker thread. It runs on
//! a normal stop, when the controller disappears, and when the loop body
//! panics.

use super::actuator::FieldActuator;
use crate::config::WorkerSettings;
use crate::error::{ControlError, DeviceError, ShutdownError};
use crate::types::{FieldVector, Published};
use crate::vision::{Detection, VisionPipeline};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the worker event channel.
///
/// When the foreground falls behind, the oldest queued events are discarded
/// so the newest ones (and always the terminal `Finished`) get through.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Identifier of one start-to-stop worker session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events sent from the worker to the foreground
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The session's thread is up and the loop is about to run
    Started { session: SessionId },
    /// A fault or notable transition
    Status { session: SessionId, message: String },
    /// A processed frame the worker has not seen before
    VisionSample {
        session: SessionId,
        sequence: u64,
        detections: Vec<Detection>,
    },
    /// The session reached `Stopped`
    Finished {
        session: SessionId,
        iterations: u64,
        zeroed: bool,
    },
}

/// What a finished session reports to the controller
#[derive(Debug)]
struct SessionOutcome {
    zero_result: Result<(), DeviceError>,
}

/// Controller-side handle of a running session
struct ActiveSession {
    id: SessionId,
    cancel_requested: Arc<AtomicBool>,
    cancel_tx: Sender<()>,
    done_rx: Receiver<SessionOutcome>,
    handle: Option<JoinHandle<()>>,
}

/// Owns the worker state machine and the current session
pub struct WorkerController {
    actuator: Arc<FieldActuator>,
    target: Arc<Published<FieldVector>>,
    vision: Option<Arc<VisionPipeline>>,
    settings: WorkerSettings,
    state: Arc<Mutex<WorkerState>>,
    period_ms: Arc<AtomicU64>,
    next_session: u64,
    session: Option<ActiveSession>,
    event_tx: Sender<WorkerEvent>,
    event_rx: Receiver<WorkerEvent>,
}

impl WorkerController {
    /// Create a stopped controller
    ///
    /// `vision` is only read when `settings.sample_vision` is set.
    pub fn new(
        actuator: Arc<FieldActuator>,
        target: Arc<Published<FieldVector>>,
        vision: Option<Arc<VisionPipeline>>,
        settings: WorkerSettings,
    ) -> Self {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let period_ms = settings.period_ms.max(1);
        Self {
            actuator,
            target,
            vision,
            settings,
            state: Arc::new(Mutex::new(WorkerState::Stopped)),
            period_ms: Arc::new(AtomicU64::new(period_ms)),
            next_session: 1,
            session: None,
            event_tx,
            event_rx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Period used for the next sleep decision
    pub fn period_ms(&self) -> u64 {
        self.period_ms.load(Ordering::SeqCst)
    }

    /// Session that is running or was last started
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Receiver of worker events; clone it to select on it
    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.event_rx
    }

    /// Start a new session.
    ///
    /// # Errors
    /// [`ControlError::AlreadyRunning`] if a session is starting, running or
    /// still stopping. Nothing changes in that case.
    pub fn start(&mut self) -> Result<SessionId, ControlError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WorkerState::Stopped {
                tracing::debug!("Ignoring start request, worker is {}", *state);
                return Err(ControlError::AlreadyRunning);
            }
            *state = WorkerState::Starting;
        }

        self.reap_finished();

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let cancel_requested = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let worker = SessionLoop {
            id,
            actuator: self.actuator.clone(),
            target: self.target.clone(),
            vision: if self.settings.sample_vision {
                self.vision.clone()
            } else {
                None
            },
            period_ms: self.period_ms.clone(),
            cancel_requested: cancel_requested.clone(),
            cancel_rx,
            last_sample: None,
        };
        let finisher = SessionFinisher {
            id,
            actuator: self.actuator.clone(),
            state: self.state.clone(),
            events: self.event_tx.clone(),
            overflow: self.event_rx.clone(),
            dropped_events: 0,
            done_tx,
            zero_attempts: self.settings.zero_attempts,
            iterations: 0,
        };

        let spawn_result = std::thread::Builder::new()
            .name(format!("field-worker-{}", id.0))
            .spawn(move || worker.run(finisher));

        let handle = match spawn_result {
            Ok(handle) => handle,
            Err(e) => {
                // The finisher was dropped with the closure, which zeroed the
                // actuator and moved the state back to Stopped.
                tracing::error!("Failed to spawn worker thread: {}", e);
                return Err(ControlError::SpawnFailed);
            }
        };

        tracing::info!(
            "Worker session {} starting at {} ms period",
            id,
            self.period_ms()
        );
        self.session = Some(ActiveSession {
            id,
            cancel_requested,
            cancel_tx,
            done_rx,
            handle: Some(handle),
        });
        Ok(id)
    }

    /// Change the loop period; the current sleep is not affected.
    ///
    /// # Errors
    /// [`ControlError::InvalidFrequency`] for a zero period.
    pub fn set_freq(&self, period_ms: u64) -> Result<(), ControlError> {
        if period_ms == 0 {
            return Err(ControlError::InvalidFrequency);
        }
        self.period_ms.store(period_ms, Ordering::SeqCst);
        tracing::debug!("Worker period set to {} ms", period_ms);
        Ok(())
    }

    /// Change the loop rate in Hz; returns the resulting period in ms.
    pub fn set_rate_hz(&self, hz: f64) -> Result<u64, ControlError> {
        let period_ms = rate_to_period_ms(hz)?;
        self.set_freq(period_ms)?;
        Ok(period_ms)
    }

    /// Request cooperative cancellation of the running session.
    ///
    /// Returns `true` if a stop was requested, `false` when there was
    /// nothing to stop.
    pub fn stop(&mut self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            WorkerState::Starting | WorkerState::Running => {
                *state = WorkerState::Stopping;
                if let Some(session) = &self.session {
                    session.cancel_requested.store(true, Ordering::SeqCst);
                    // Wakes the worker if it is sleeping; a full slot means a wake-up is pending.
                    let _ = session.cancel_tx.try_send(());
                    tracing::info!("Stop requested for worker session {}", session.id);
                }
                true
            }
            WorkerState::Stopping | WorkerState::Stopped => false,
        }
    }

    /// Stop the worker and block until it reports `Stopped` with the
    /// actuator zeroed.
    ///
    /// # Errors
    /// A [`ShutdownError`] when the worker does not finish within `timeout`,
    /// panicked, or could not zero the actuator. These are logged at error
    /// level because the field may still be live.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), ShutdownError> {
        self.stop();

        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let outcome = match session.done_rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    "Worker session {} did not stop within {:?}; field may still be live",
                    session.id,
                    timeout
                );
                self.session = Some(session);
                return Err(ShutdownError::Timeout(timeout.as_millis() as u64));
            }
        };

        let panicked = match session.handle.take() {
            Some(handle) => handle.join().is_err(),
            None => false,
        };

        if let Err(e) = outcome.zero_result {
            tracing::error!(
                "Worker session {} ended without zeroing the field: {}",
                session.id,
                e
            );
            return Err(ShutdownError::ZeroFailed(e));
        }
        if panicked {
            tracing::error!("Worker session {} panicked", session.id);
            return Err(ShutdownError::WorkerPanicked);
        }

        tracing::info!("Worker session {} shut down", session.id);
        Ok(())
    }

    /// Join the thread of a session that already reached `Stopped`
    fn reap_finished(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.done_rx.try_recv();
            if let Some(handle) = session.handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("Previous worker session {} had panicked", session.id);
                }
            }
        }
    }
}

impl Drop for WorkerController {
    fn drop(&mut self) {
        if self.session.is_some() {
            let timeout = self.settings.shutdown_timeout();
            if let Err(e) = self.shutdown(timeout) {
                tracing::error!("Worker shutdown on drop failed: {}", e);
            }
        }
    }
}

/// Convert a rate in Hz to a loop period in whole milliseconds (at least 1)
pub fn rate_to_period_ms(hz: f64) -> Result<u64, ControlError> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(ControlError::InvalidFrequency);
    }
    let period = (1000.0 / hz).round();
    Ok((period as u64).max(1))
}

/// State moved into the worker thread
struct SessionLoop {
    id: SessionId,
    actuator: Arc<FieldActuator>,
    target: Arc<Published<FieldVector>>,
    vision: Option<Arc<VisionPipeline>>,
    period_ms: Arc<AtomicU64>,
    cancel_requested: Arc<AtomicBool>,
    cancel_rx: Receiver<()>,
    last_sample: Option<u64>,
}

impl SessionLoop {
    fn run(mut self, mut finisher: SessionFinisher) {
        finisher.mark_running();

        loop {
            if self.cancel_requested.load(Ordering::SeqCst) {
                break;
            }
            finisher.iterations += 1;

            if let Err(e) = self.actuator.apply_published(&self.target) {
                tracing::warn!("Worker {} failed to apply field: {}", self.id, e);
                finisher.emit(WorkerEvent::Status {
                    session: self.id,
                    message: format!("device fault: {}", e),
                });
            }

            if let Some(event) = self.sample_vision() {
                finisher.emit(event);
            }

            let period = Duration::from_millis(self.period_ms.load(Ordering::SeqCst));
            match self.cancel_rx.recv_timeout(period) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Worker {} lost its controller, stopping", self.id);
                    self.cancel_requested.store(true, Ordering::SeqCst);
                }
            }
        }

        tracing::debug!(
            "Worker {} observed cancellation after {} iterations",
            self.id,
            finisher.iterations
        );
    }

    fn sample_vision(&mut self) -> Option<WorkerEvent> {
        let vision = self.vision.as_ref()?;
        let frame = vision.latest_frame()?;
        if self.last_sample == Some(frame.sequence) {
            return None;
        }
        self.last_sample = Some(frame.sequence);
        Some(WorkerEvent::VisionSample {
            session: self.id,
            sequence: frame.sequence,
            detections: frame.detections.clone(),
        })
    }
}

/// Terminal sequence of a session, run when the worker thread unwinds or returns
struct SessionFinisher {
    id: SessionId,
    actuator: Arc<FieldActuator>,
    state: Arc<Mutex<WorkerState>>,
    events: Sender<WorkerEvent>,
    /// Receiving end used to discard the oldest event when the queue is full
    overflow: Receiver<WorkerEvent>,
    dropped_events: u64,
    done_tx: Sender<SessionOutcome>,
    zero_attempts: u32,
    iterations: u64,
}

impl SessionFinisher {
    fn mark_running(&mut self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == WorkerState::Starting {
                *state = WorkerState::Running;
            }
        }
        tracing::info!("Worker session {} running", self.id);
        self.emit(WorkerEvent::Started { session: self.id });
    }

    fn emit(&mut self, event: WorkerEvent) {
        let mut event = event;
        loop {
            match self.events.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.overflow.try_recv().is_ok() {
                        if self.dropped_events == 0 {
                            tracing::warn!(
                                "Worker {} event queue full, dropping oldest events",
                                self.id
                            );
                        }
                        self.dropped_events += 1;
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl Drop for SessionFinisher {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("Worker session {} panicked, zeroing field", self.id);
            self.emit(WorkerEvent::Status {
                session: self.id,
                message: "worker panicked".to_string(),
            });
        }

        let zero_result = self.actuator.zero_with_retries(self.zero_attempts);
        match &zero_result {
            Ok(()) => tracing::info!("Worker session {} zeroed the field", self.id),
            Err(e) => {
                tracing::error!("Worker session {} could not zero the field: {}", self.id, e);
                self.emit(WorkerEvent::Status {
                    session: self.id,
                    message: format!("failed to zero field: {}", e),
                });
            }
        }

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = WorkerState::Stopped;

        if self.dropped_events > 0 {
            tracing::warn!(
                "Worker session {} dropped {} events the foreground did not read",
                self.id,
                self.dropped_events
            );
        }

        self.emit(WorkerEvent::Finished {
            session: self.id,
            iterations: self.iterations,
            zeroed: zero_result.is_ok(),
        });
        let _ = self.done_tx.send(SessionOutcome { zero_result });
    }
}
