//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Poll `cond` until it holds or `timeout` expires
pub fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Assert a duration lies in `[min_ms, max_ms]`
pub fn assert_duration_between(actual: Duration, min_ms: u64, max_ms: u64) {
    assert!(
        actual >= Duration::from_millis(min_ms) && actual <= Duration::from_millis(max_ms),
        "Expected {:?} to be between {} ms and {} ms",
        actual,
        min_ms,
        max_ms
    );
}
