// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the defaults below.

use crate::error::ConfigError;
use crate::schema::SchemaDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelsemConfig {
    pub heartbeat: HeartbeatConfig,
    pub backoff: BackoffConfig,
    pub reaper: ReaperConfig,
    pub schema: SchemaDescriptor,
}

/// Owner liveness settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Refresh period; also the interval each owner promises
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// An owner is stale after `interval * grace_multiplier` without a heartbeat
    pub grace_multiplier: u32,
    /// Attempts per refresh (and per release) before giving up on a transient failure
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            grace_multiplier: 3,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(50),
        }
    }
}

impl HeartbeatConfig {
    /// How long an owner may go silent before a reaper may reclaim it
    pub fn grace_window(&self) -> Duration {
        self.interval.saturating_mul(self.grace_multiplier)
    }

    pub fn interval_millis(&self) -> i64 {
        self.interval.as_millis().min(i64::MAX as u128) as i64
    }
}

/// Acquire retry backoff
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First sleep between attempts
    #[serde(with = "humantime_serde")]
    pub floor: Duration,
    /// Upper bound for the exponential part of the sleep
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
    /// Fraction of each sleep that may be randomly cut off, in [0, 1]
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(10),
            ceiling: Duration::from_millis(500),
            jitter: 0.5,
        }
    }
}

/// When the reaper runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Run the reaper whenever an acquire attempt is denied
    pub on_contention: bool,
    /// Also run it on a fixed schedule
    #[serde(with = "humantime_serde", default)]
    pub interval: Option<Duration>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            on_contention: true,
            interval: None,
        }
    }
}

impl RelsemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat.interval = interval;
        self
    }

    pub fn with_grace_multiplier(mut self, multiplier: u32) -> Self {
        self.heartbeat.grace_multiplier = multiplier;
        self
    }

    pub fn with_backoff(mut self, floor: Duration, ceiling: Duration, jitter: f64) -> Self {
        self.backoff = BackoffConfig {
            floor,
            ceiling,
            jitter,
        };
        self
    }

    pub fn with_reap_on_contention(mut self, enabled: bool) -> Self {
        self.reaper.on_contention = enabled;
        self
    }

    pub fn with_reap_interval(mut self, interval: Option<Duration>) -> Self {
        self.reaper.interval = interval;
        self
    }

    pub fn with_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = schema;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if self.heartbeat.interval.is_zero() {
            return invalid("heartbeat.interval must be greater than zero");
        }
        if self.heartbeat.grace_multiplier < 2 {
            return invalid("heartbeat.grace_multiplier must be at least 2");
        }
        if self.heartbeat.retry_attempts == 0 {
            return invalid("heartbeat.retry_attempts must be at least 1");
        }
        if self.backoff.floor.is_zero() {
            return invalid("backoff.floor must be greater than zero");
        }
        if self.backoff.floor > self.backoff.ceiling {
            return invalid("backoff.floor must not exceed backoff.ceiling");
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return invalid("backoff.jitter must be within [0, 1]");
        }
        if self.reaper.interval.is_some_and(|i| i.is_zero()) {
            return invalid("reaper.interval must be greater than zero");
        }
        self.schema
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
