//! Fixed-rate sampler for the vision update
//!
//! The sampler ticks [`VisionPipeline::update`] on the foreground context.
//! At most one update is in flight; a tick that arrives while one is running
//! is counted as skipped and dropped, never queued.
//!
//! Deadlines are accounted on the sampler's own schedule, not on the
//! instants the tick channel reports: a channel that fell behind hands back
//! a stale instant, and counting from it would count the same deadlines
//! twice. Each tick claims every deadline that came due since the previous
//! tick; one of them is served by an update and the rest are skipped.

use super::pipeline::{UpdateOutcome, VisionPipeline};
use crate::error::CaptureError;
use crossbeam_channel::{select, tick, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What one tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// `update()` ran to completion
    Updated(UpdateOutcome),
    /// Another update was still in flight
    Skipped,
    /// `update()` returned a capture error
    Failed(CaptureError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub updates: u64,
    /// Overlapping ticks plus deadlines missed during slow updates
    pub skipped: u64,
    pub capture_failures: u64,
}

#[derive(Debug, Default)]
struct Schedule {
    stats: SamplerStats,
    /// Earliest deadline not yet claimed by a tick
    next_deadline: Option<Instant>,
}

impl Schedule {
    /// Claim the deadlines due at `at`, re-anchoring the schedule on `at`.
    ///
    /// Returns at least 1: a tick that arrives early claims the upcoming
    /// deadline.
    fn claim(&mut self, at: Instant, interval: Duration) -> u64 {
        let due = match self.next_deadline {
            Some(next) if at >= next => {
                1 + (at.duration_since(next).as_nanos() / interval.as_nanos()) as u64
            }
            _ => 1,
        };
        self.next_deadline = Some(at + interval);
        due
    }
}

/// Drives the vision update at a fixed interval
pub struct ScheduledSampler {
    pipeline: Arc<VisionPipeline>,
    interval: Duration,
    in_flight: AtomicBool,
    schedule: Mutex<Schedule>,
}

/// Clears the in-flight flag even if the update panics
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ScheduledSampler {
    pub fn new(pipeline: Arc<VisionPipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval: interval.max(Duration::from_millis(1)),
            in_flight: AtomicBool::new(false),
            schedule: Mutex::new(Schedule::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pipeline(&self) -> &Arc<VisionPipeline> {
        &self.pipeline
    }

    /// Tick channel for an event loop
    pub fn ticker(&self) -> Receiver<Instant> {
        tick(self.interval)
    }

    pub fn stats(&self) -> SamplerStats {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    fn with_schedule<R>(&self, f: impl FnOnce(&mut Schedule) -> R) -> R {
        f(&mut self.schedule.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Handle one tick delivered at `now`
    pub fn fire(&self, now: Instant) -> TickOutcome {
        let started = Instant::now();
        let lateness = started.saturating_duration_since(now);
        if lateness > self.interval {
            tracing::trace!("Sampler tick delivered {:?} late", lateness);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.with_schedule(|sched| {
                let due = sched.claim(started, self.interval);
                sched.stats.ticks += 1;
                sched.stats.skipped += due;
            });
            tracing::trace!("Sampler tick skipped, update still in flight");
            return TickOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        let missed = self.with_schedule(|sched| {
            let due = sched.claim(started, self.interval);
            sched.stats.ticks += 1;
            sched.stats.skipped += due - 1;
            due - 1
        });
        if missed > 0 {
            tracing::debug!("{} sampler deadlines passed without an update", missed);
        }

        match self.pipeline.update() {
            Ok(outcome) => {
                self.with_schedule(|sched| sched.stats.updates += 1);
                TickOutcome::Updated(outcome)
            }
            Err(e) => {
                self.with_schedule(|sched| sched.stats.capture_failures += 1);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick on the current thread until `stop` receives or disconnects
    pub fn run_until(&self, stop: &Receiver<()>) {
        let ticker = self.ticker();
        tracing::info!("Sampler running every {:?}", self.interval);
        loop {
            select! {
                recv(ticker) -> at => {
                    if let Ok(at) = at {
                        self.fire(at);
                    }
                }
                recv(stop) -> _ => break,
            }
        }
        tracing::info!("Sampler stopped: {:?}", self.stats());
    }
}

impl std::fmt::Debug for ScheduledSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledSampler")
            .field("interval", &self.interval)
            .field("stats", &self.stats())
            .finish()
    }
}
