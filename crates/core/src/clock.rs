// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! `now()` drives client-side deadlines and backoff. `epoch_millis()` is only
//! consulted by in-memory stores standing in for the database clock; real
//! stores compute "now" themselves.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic time used for deadlines
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch
    fn epoch_millis(&self) -> i64;
}

/// Real system clock
///
/// Monotonic readings come from tokio's timer, which matches
/// `Instant::now()` unless the runtime's time is paused (tests).
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn epoch_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(i64::MAX as u128) as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct FakeTime {
    instant: Instant,
    epoch_millis: i64,
}

/// Fake clock for testing with controllable time
///
/// Advancing moves both the monotonic instant and the epoch reading, so a
/// fake store and a client sharing one clock agree on elapsed time.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::starting_at(1_700_000_000_000)
    }

    /// Create a clock whose epoch reading starts at `epoch_millis`
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            current: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                epoch_millis,
            })),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.instant += duration;
        current.epoch_millis = current
            .epoch_millis
            .saturating_add(duration.as_millis().min(i64::MAX as u128) as i64);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).instant
    }

    fn epoch_millis(&self) -> i64 {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .epoch_millis
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
