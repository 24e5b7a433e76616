// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for stores and the semaphore client

use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a heartbeat or semaphore store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity, busy or lock-timeout failure
    #[error("store unavailable: {0}")]
    Unavailable(#[source] BoxError),
    /// Any other driver failure
    #[error("store backend error: {0}")]
    Backend(#[source] BoxError),
    #[error("semaphore {name} already exists with {existing} permits (requested {requested})")]
    CapacityConflict {
        name: String,
        existing: u32,
        requested: u32,
    },
    #[error("owner {owner} cannot release {requested} permits of {name}: holds {held}")]
    OverRelease {
        name: String,
        owner: String,
        requested: u32,
        held: u32,
    },
    #[error("semaphore {0} does not exist")]
    UnknownPool(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed
    ///
    /// Every driver failure counts as transient; only logical invariant
    /// violations are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }
}

/// Errors surfaced by [`crate::SemaphoreClient`]
#[derive(Debug, Error)]
pub enum SemaphoreError {
    #[error("semaphore {name} already exists with {existing} permits (requested {requested})")]
    CapacityConflict {
        name: String,
        existing: u32,
        requested: u32,
    },
    #[error("timed out after {waited:?} acquiring {permits} permits of {name}")]
    TimeoutExceeded {
        name: String,
        permits: u32,
        waited: Duration,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("owner {owner} cannot release {requested} permits of {name}: holds {held}")]
    OverRelease {
        name: String,
        owner: String,
        requested: u32,
        held: u32,
    },
    #[error("semaphore {0} does not exist")]
    UnknownPool(String),
    #[error("transient store failure: {0}")]
    TransientStoreFailure(#[source] StoreError),
    #[error("acquire cancelled")]
    Cancelled,
    #[error("semaphore client is closed")]
    Closed,
}

impl From<StoreError> for SemaphoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::CapacityConflict {
                name,
                existing,
                requested,
            } => Self::CapacityConflict {
                name,
                existing,
                requested,
            },
            StoreError::OverRelease {
                name,
                owner,
                requested,
                held,
            } => Self::OverRelease {
                name,
                owner,
                requested,
                held,
            },
            StoreError::UnknownPool(name) => Self::UnknownPool(name),
            StoreError::InvalidSchema(message) => {
                Self::InvalidArgument(format!("invalid schema: {message}"))
            }
            other => Self::TransientStoreFailure(other),
        }
    }
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
