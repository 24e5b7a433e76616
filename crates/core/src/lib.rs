// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relsem-core: a counting semaphore shared through a relational store
//!
//! This crate provides:
//! - Store traits for heartbeats and permit accounting
//! - The heartbeat emitter and its per-process registry
//! - The reaper that reclaims permits of stale owners
//! - The semaphore client (`acquire` / `release` / `close`)
//! - An in-memory fake store for tests (`test-support` feature)

pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod id;
pub mod reaper;
pub mod schema;
pub mod store;

mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use backoff::Backoff;
pub use client::{SemaphoreClient, SemaphoreClientBuilder};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{BackoffConfig, HeartbeatConfig, ReaperConfig, RelsemConfig};
pub use error::{ConfigError, SemaphoreError, StoreError};
pub use heartbeat::{EmitterState, HeartbeatEmitter, HeartbeatRegistry};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use reaper::{spawn_reaper_task, ReapReport, ReapScope, Reaper, Reclaimed};
pub use schema::{SchemaDescriptor, SQLITE_NOW_MILLIS};
pub use store::{
    HeartbeatRecord, HeartbeatStore, PermitLedgerEntry, SemaphorePool, SemaphoreStore, Stores,
};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FailureKind, FakeStore, HeldCall, StoreCall};

pub use tokio_util::sync::CancellationToken;
