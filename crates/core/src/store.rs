// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store traits for heartbeats and permit accounting
//!
//! Implementations must run every mutating operation in a single transaction
//! that write-locks the rows it reads, and must compute "now" with the
//! store's own clock. Nothing may be cached between calls: several processes
//! act on the same tables concurrently.

use crate::error::StoreError;
use serde::Serialize;
use std::sync::Arc;

/// One row of the heartbeat table, as observed by the store clock
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeartbeatRecord {
    pub owner: String,
    pub interval_millis: i64,
    pub last_heartbeat_millis: i64,
    /// Store "now" minus `last_heartbeat_millis` at read time
    pub age_millis: i64,
}

impl HeartbeatRecord {
    pub fn is_stale(&self, grace_multiplier: u32) -> bool {
        self.age_millis > self.interval_millis.saturating_mul(i64::from(grace_multiplier))
    }
}

/// A named permit pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SemaphorePool {
    pub name: String,
    pub total_permits: u32,
    pub available_permits: u32,
}

impl SemaphorePool {
    /// Permits currently checked out across all owners
    pub fn checked_out(&self) -> u32 {
        self.total_permits.saturating_sub(self.available_permits)
    }
}

/// Permits one owner holds on one pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermitLedgerEntry {
    pub semaphore_name: String,
    pub owner: String,
    pub held_permits: u32,
}

/// CRUD against the heartbeat table
pub trait HeartbeatStore: Send + Sync {
    /// Create the heartbeat table if it does not exist
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Upsert the owner's row, stamping it with the store's current time
    fn register_or_refresh(&self, owner: &str, interval_millis: i64) -> Result<(), StoreError>;

    /// Owners whose last heartbeat is older than `interval * grace_multiplier`
    fn list_stale_owners(&self, grace_multiplier: u32) -> Result<Vec<String>, StoreError>;

    /// Delete the owner's row; `Ok(false)` when it was already gone
    fn remove(&self, owner: &str) -> Result<bool, StoreError>;

    /// Every heartbeat row, ordered by owner
    fn heartbeats(&self) -> Result<Vec<HeartbeatRecord>, StoreError>;
}

/// Transactional permit accounting against the pool and ledger tables
pub trait SemaphoreStore: Send + Sync {
    /// Create the pool and ledger tables if they do not exist
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert the pool full; `CapacityConflict` if it exists with another total
    fn create_pool_if_absent(&self, name: &str, total_permits: u32) -> Result<(), StoreError>;

    /// Move `permits` from the pool to the owner's ledger entry if available
    fn try_grant(&self, name: &str, owner: &str, permits: u32) -> Result<bool, StoreError>;

    /// Move `permits` from the owner's ledger entry back to the pool
    fn release(&self, name: &str, owner: &str, permits: u32) -> Result<(), StoreError>;

    /// Return everything the owner holds on `name` to the pool; returns the amount
    fn reclaim(&self, name: &str, owner: &str) -> Result<u32, StoreError>;

    fn pool(&self, name: &str) -> Result<Option<SemaphorePool>, StoreError>;

    fn pools(&self) -> Result<Vec<SemaphorePool>, StoreError>;

    /// Ledger entries of one pool, ordered by owner
    fn ledger(&self, name: &str) -> Result<Vec<PermitLedgerEntry>, StoreError>;

    fn held_permits(&self, name: &str, owner: &str) -> Result<u32, StoreError>;

    /// Names of pools on which the owner holds permits
    fn pools_held_by(&self, owner: &str) -> Result<Vec<String>, StoreError>;
}

/// The two stores of one data source (one database)
#[derive(Clone)]
pub struct Stores {
    /// Stable identity of the database, e.g. its canonical path
    pub data_source: String,
    pub heartbeats: Arc<dyn HeartbeatStore>,
    pub semaphores: Arc<dyn SemaphoreStore>,
}

impl Stores {
    pub fn new(
        data_source: impl Into<String>,
        heartbeats: Arc<dyn HeartbeatStore>,
        semaphores: Arc<dyn SemaphoreStore>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            heartbeats,
            semaphores,
        }
    }

    /// Use one object implementing both traits
    pub fn shared<S>(data_source: impl Into<String>, store: Arc<S>) -> Self
    where
        S: HeartbeatStore + SemaphoreStore + 'static,
    {
        Self {
            data_source: data_source.into(),
            heartbeats: store.clone(),
            semaphores: store,
        }
    }

    /// Install every table
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.heartbeats.ensure_schema()?;
        self.semaphores.ensure_schema()
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("data_source", &self.data_source)
            .finish_non_exhaustive()
    }
}
