// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store for testing
//!
//! Implements both store traits over one mutex, so every operation is
//! trivially atomic. "Now" comes from the injected clock, playing the role of
//! the database clock. Transient failures can be injected per operation kind,
//! and the next call of a kind can be parked to line up races.

use crate::clock::{Clock, FakeClock};
use crate::error::StoreError;
use crate::store::{
    HeartbeatRecord, HeartbeatStore, PermitLedgerEntry, SemaphorePool, SemaphoreStore,
};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Recorded call to a store method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    RegisterOrRefresh { owner: String },
    ListStaleOwners { grace_multiplier: u32 },
    Remove { owner: String },
    CreatePool { name: String, total: u32 },
    TryGrant { name: String, owner: String, permits: u32 },
    Release { name: String, owner: String, permits: u32 },
    Reclaim { name: String, owner: String },
}

/// Operation kinds for failure injection and [`FakeStore::hold_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Heartbeat,
    Grant,
    /// Both `release` and `reclaim`
    Release,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<StoreCall>,
    schema_installed: bool,
    /// owner -> (interval_millis, last_heartbeat_millis)
    heartbeats: BTreeMap<String, (i64, i64)>,
    /// name -> (total, available)
    pools: BTreeMap<String, (u32, u32)>,
    /// (name, owner) -> held
    ledger: BTreeMap<(String, String), u32>,
    failing_heartbeats: u32,
    failing_grants: u32,
    failing_releases: u32,
    parked: Option<(FailureKind, Sender<()>, Receiver<()>)>,
}

/// A store call parked by [`FakeStore::hold_next`]
///
/// The call blocks its thread before touching any state and proceeds once
/// this handle is released or dropped.
pub struct HeldCall {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl HeldCall {
    /// Block until the parked call has started; false on timeout
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// In-memory heartbeat and semaphore store
#[derive(Clone)]
pub struct FakeStore<C: Clock = FakeClock> {
    state: Arc<Mutex<FakeState>>,
    clock: C,
}

impl Default for FakeStore<FakeClock> {
    fn default() -> Self {
        Self::new(FakeClock::new())
    }
}

impl<C: Clock> FakeStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `count` operations of the given kind with a transient error
    pub fn fail_next(&self, kind: FailureKind, count: u32) {
        let mut state = self.lock();
        match kind {
            FailureKind::Heartbeat => state.failing_heartbeats = count,
            FailureKind::Grant => state.failing_grants = count,
            FailureKind::Release => state.failing_releases = count,
        }
    }

    /// Park the next operation of `kind` until the returned handle lets it go
    pub fn hold_next(&self, kind: FailureKind) -> HeldCall {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.lock().parked = Some((kind, entered_tx, release_rx));
        HeldCall {
            entered: entered_rx,
            release: release_tx,
        }
    }

    fn wait_if_parked(&self, kind: FailureKind) {
        let parked = {
            let mut state = self.lock();
            match &state.parked {
                Some((parked_kind, _, _)) if *parked_kind == kind => state.parked.take(),
                _ => None,
            }
        };
        if let Some((_, entered, release)) = parked {
            let _ = entered.send(());
            let _ = release.recv();
        }
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn schema_installed(&self) -> bool {
        self.lock().schema_installed
    }

    /// Last heartbeat of an owner in store milliseconds
    pub fn last_heartbeat(&self, owner: &str) -> Option<i64> {
        self.lock().heartbeats.get(owner).map(|(_, last)| *last)
    }

    /// Whether `available + sum(held) == total` for the pool
    pub fn invariant_holds(&self, name: &str) -> bool {
        let state = self.lock();
        let Some((total, available)) = state.pools.get(name).copied() else {
            return true;
        };
        let held: u32 = state
            .ledger
            .iter()
            .filter(|((pool, _), _)| pool == name)
            .map(|(_, held)| *held)
            .sum();
        available <= total && available + held == total
    }
}

fn injected() -> StoreError {
    StoreError::Unavailable(Box::new(std::io::Error::other("injected store failure")))
}

fn take_failure(counter: &mut u32) -> Result<(), StoreError> {
    if *counter > 0 {
        *counter -= 1;
        return Err(injected());
    }
    Ok(())
}

impl<C: Clock> HeartbeatStore for FakeStore<C> {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.lock().schema_installed = true;
        Ok(())
    }

    fn register_or_refresh(&self, owner: &str, interval_millis: i64) -> Result<(), StoreError> {
        self.wait_if_parked(FailureKind::Heartbeat);
        let now = self.clock.epoch_millis();
        let mut state = self.lock();
        state.calls.push(StoreCall::RegisterOrRefresh {
            owner: owner.to_string(),
        });
        take_failure(&mut state.failing_heartbeats)?;
        state
            .heartbeats
            .insert(owner.to_string(), (interval_millis, now));
        Ok(())
    }

    fn list_stale_owners(&self, grace_multiplier: u32) -> Result<Vec<String>, StoreError> {
        let now = self.clock.epoch_millis();
        let mut state = self.lock();
        state
            .calls
            .push(StoreCall::ListStaleOwners { grace_multiplier });
        Ok(state
            .heartbeats
            .iter()
            .filter(|(_, (interval, last))| {
                now - last > interval.saturating_mul(i64::from(grace_multiplier))
            })
            .map(|(owner, _)| owner.clone())
            .collect())
    }

    fn remove(&self, owner: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Remove {
            owner: owner.to_string(),
        });
        Ok(state.heartbeats.remove(owner).is_some())
    }

    fn heartbeats(&self) -> Result<Vec<HeartbeatRecord>, StoreError> {
        let now = self.clock.epoch_millis();
        Ok(self
            .lock()
            .heartbeats
            .iter()
            .map(|(owner, (interval, last))| HeartbeatRecord {
                owner: owner.clone(),
                interval_millis: *interval,
                last_heartbeat_millis: *last,
                age_millis: now - last,
            })
            .collect())
    }
}

impl<C: Clock> SemaphoreStore for FakeStore<C> {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.lock().schema_installed = true;
        Ok(())
    }

    fn create_pool_if_absent(&self, name: &str, total_permits: u32) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::CreatePool {
            name: name.to_string(),
            total: total_permits,
        });
        match state.pools.get(name) {
            Some((existing, _)) if *existing != total_permits => {
                Err(StoreError::CapacityConflict {
                    name: name.to_string(),
                    existing: *existing,
                    requested: total_permits,
                })
            }
            Some(_) => Ok(()),
            None => {
                state
                    .pools
                    .insert(name.to_string(), (total_permits, total_permits));
                Ok(())
            }
        }
    }

    fn try_grant(&self, name: &str, owner: &str, permits: u32) -> Result<bool, StoreError> {
        self.wait_if_parked(FailureKind::Grant);
        let mut state = self.lock();
        state.calls.push(StoreCall::TryGrant {
            name: name.to_string(),
            owner: owner.to_string(),
            permits,
        });
        take_failure(&mut state.failing_grants)?;
        let available = match state.pools.get(name) {
            Some((_, available)) => *available,
            None => return Err(StoreError::UnknownPool(name.to_string())),
        };
        if available < permits {
            return Ok(false);
        }
        if let Some(pool) = state.pools.get_mut(name) {
            pool.1 -= permits;
        }
        *state
            .ledger
            .entry((name.to_string(), owner.to_string()))
            .or_insert(0) += permits;
        Ok(true)
    }

    fn release(&self, name: &str, owner: &str, permits: u32) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Release {
            name: name.to_string(),
            owner: owner.to_string(),
            permits,
        });
        take_failure(&mut state.failing_releases)?;
        if !state.pools.contains_key(name) {
            return Err(StoreError::UnknownPool(name.to_string()));
        }
        let key = (name.to_string(), owner.to_string());
        let held = state.ledger.get(&key).copied().unwrap_or(0);
        if permits > held {
            return Err(StoreError::OverRelease {
                name: name.to_string(),
                owner: owner.to_string(),
                requested: permits,
                held,
            });
        }
        if held == permits {
            state.ledger.remove(&key);
        } else {
            state.ledger.insert(key, held - permits);
        }
        if let Some(pool) = state.pools.get_mut(name) {
            pool.1 += permits;
        }
        Ok(())
    }

    fn reclaim(&self, name: &str, owner: &str) -> Result<u32, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Reclaim {
            name: name.to_string(),
            owner: owner.to_string(),
        });
        take_failure(&mut state.failing_releases)?;
        let held = state
            .ledger
            .remove(&(name.to_string(), owner.to_string()))
            .unwrap_or(0);
        if let Some(pool) = state.pools.get_mut(name) {
            pool.1 += held;
        }
        Ok(held)
    }

    fn pool(&self, name: &str) -> Result<Option<SemaphorePool>, StoreError> {
        Ok(self
            .lock()
            .pools
            .get(name)
            .map(|(total, available)| SemaphorePool {
                name: name.to_string(),
                total_permits: *total,
                available_permits: *available,
            }))
    }

    fn pools(&self) -> Result<Vec<SemaphorePool>, StoreError> {
        Ok(self
            .lock()
            .pools
            .iter()
            .map(|(name, (total, available))| SemaphorePool {
                name: name.clone(),
                total_permits: *total,
                available_permits: *available,
            })
            .collect())
    }

    fn ledger(&self, name: &str) -> Result<Vec<PermitLedgerEntry>, StoreError> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .filter(|((pool, _), _)| pool == name)
            .map(|((pool, owner), held)| PermitLedgerEntry {
                semaphore_name: pool.clone(),
                owner: owner.clone(),
                held_permits: *held,
            })
            .collect())
    }

    fn held_permits(&self, name: &str, owner: &str) -> Result<u32, StoreError> {
        Ok(self
            .lock()
            .ledger
            .get(&(name.to_string(), owner.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn pools_held_by(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .ledger
            .keys()
            .filter(|(_, o)| o == owner)
            .map(|(pool, _)| pool.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
