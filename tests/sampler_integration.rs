//! Integration tests for the scheduled sampler
//!
//! These tests validate skip-on-overlap: a tick that arrives while an update
//! is in flight is dropped, never queued, and updates never overlap.

mod common;

use common::builders::synthetic_pipeline;
use common::mock_helpers::GatedCamera;
use common::{test_timeout, wait_for};
use crossbeam_channel::bounded;
use magctl_rs::config::VisionSettings;
use magctl_rs::vision::{ScheduledSampler, TickOutcome, UpdateOutcome, VisionPipeline};
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn test_overlapping_tick_is_skipped() {
    let (camera, gate, stats) = GatedCamera::new();
    let pipeline = Arc::new(VisionPipeline::new(
        Box::new(camera),
        &VisionSettings::default(),
    ));
    let sampler = Arc::new(ScheduledSampler::new(pipeline, Duration::from_millis(5)));

    let first = {
        let sampler = sampler.clone();
        std::thread::spawn(move || sampler.fire(Instant::now()))
    };
    assert!(wait_for(
        || stats.in_capture.load(Ordering::SeqCst) == 1,
        test_timeout()
    ));

    // Returns immediately instead of waiting for the gate
    assert!(matches!(sampler.fire(Instant::now()), TickOutcome::Skipped));
    assert!(matches!(sampler.fire(Instant::now()), TickOutcome::Skipped));

    gate.send(()).unwrap();
    let outcome = first.join().unwrap();
    assert!(matches!(
        outcome,
        TickOutcome::Updated(UpdateOutcome::Processed(_))
    ));

    assert_eq!(stats.captures.load(Ordering::SeqCst), 1);
    assert_eq!(stats.max_concurrent.load(Ordering::SeqCst), 1);
    let sampler_stats = sampler.stats();
    assert_eq!(sampler_stats.ticks, 3);
    assert_eq!(sampler_stats.updates, 1);
    assert!(sampler_stats.skipped >= 2);

    // The next tick runs normally again
    gate.send(()).unwrap();
    assert!(matches!(
        sampler.fire(Instant::now()),
        TickOutcome::Updated(UpdateOutcome::Processed(_))
    ));
}

#[test]
#[serial]
fn test_slow_capture_never_queues_ticks() {
    let (pipeline, control) = synthetic_pipeline(VisionSettings::default());
    control.set_capture_delay(Duration::from_millis(20));
    let sampler = ScheduledSampler::new(pipeline, Duration::from_millis(5));
    let (stop_tx, stop_rx) = bounded(1);

    let run_for = Duration::from_millis(200);
    let started = Instant::now();
    std::thread::scope(|scope| {
        scope.spawn(|| sampler.run_until(&stop_rx));
        std::thread::sleep(run_for);
        stop_tx.send(()).unwrap();
    });
    let elapsed = started.elapsed();

    let stats = sampler.stats();
    // At 20 ms per capture at most ~10 updates fit, never one per 5 ms tick
    assert!(stats.updates >= 3, "stats: {:?}", stats);
    assert!(stats.updates <= 12, "stats: {:?}", stats);
    assert!(stats.skipped >= stats.updates * 2, "stats: {:?}", stats);
    // Every deadline is either served or skipped, never both
    let deadlines = (elapsed.as_millis() / 5) as u64 + 1;
    assert!(
        stats.updates + stats.skipped <= deadlines,
        "stats: {:?}, deadlines: {}",
        stats,
        deadlines
    );
    assert_eq!(control.captures(), stats.updates);
}

#[test]
#[serial]
fn test_sampler_keeps_ticking_through_capture_failures() {
    let (pipeline, control) = synthetic_pipeline(VisionSettings {
        backoff_min_ms: 10,
        backoff_max_ms: 20,
        ..VisionSettings::default()
    });
    control.set_connected(false);
    let sampler = ScheduledSampler::new(pipeline.clone(), Duration::from_millis(2));

    let mut failures = 0;
    let mut backing_off = 0;
    let deadline = Instant::now() + Duration::from_millis(100);
    while Instant::now() < deadline {
        match sampler.fire(Instant::now()) {
            TickOutcome::Failed(_) => failures += 1,
            TickOutcome::Updated(UpdateOutcome::BackingOff) => backing_off += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    // Window caps at 20 ms, so a few attempts happen but most ticks back off
    assert!(failures >= 2 && failures <= 10, "failures = {}", failures);
    assert!(backing_off > failures);
    assert_eq!(sampler.stats().capture_failures, failures);

    control.set_connected(true);
    assert!(wait_for(
        || matches!(
            sampler.fire(Instant::now()),
            TickOutcome::Updated(UpdateOutcome::Processed(_))
        ),
        test_timeout()
    ));
    assert!(pipeline.latest_frame().is_some());
}
