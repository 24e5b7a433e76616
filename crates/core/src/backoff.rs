// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jittered exponential backoff for acquire retries
//!
//! Pure policy: it only says how long to wait. The acquire loop owns the
//! attempt, the deadline and cancellation.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Compute one jittered sleep from the current backoff step.
///
/// The result lies in `[current * (1 - jitter), current]`, so the ceiling on
/// `current` also bounds every sleep. `random` is clamped to [0, 1].
pub fn jittered(current: Duration, jitter: f64, random: f64) -> Duration {
    let reduction = jitter.clamp(0.0, 1.0) * random.clamp(0.0, 1.0);
    if reduction <= 0.0 {
        return current;
    }
    current.mul_f64(1.0 - reduction)
}

/// Stateful backoff sequence: floor, 2x floor, 4x floor ... capped at ceiling
#[derive(Clone, Debug)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    jitter: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            floor: config.floor,
            ceiling: config.ceiling,
            jitter: config.jitter,
            current: config.floor.min(config.ceiling),
        }
    }

    /// Next sleep using thread-local randomness
    pub fn next_delay(&mut self) -> Duration {
        let random: f64 = rand::thread_rng().gen();
        self.next_delay_with(random)
    }

    /// Next sleep with a caller-provided random value in [0, 1]
    pub fn next_delay_with(&mut self, random: f64) -> Duration {
        let delay = jittered(self.current, self.jitter, random);
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Start over from the floor
    pub fn reset(&mut self) {
        self.current = self.floor.min(self.ceiling);
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
