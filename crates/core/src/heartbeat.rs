// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat emission for owners of a data source
//!
//! One [`HeartbeatEmitter`] per data source refreshes the heartbeat row of
//! every registered owner once per interval. Emitters are shared through a
//! [`HeartbeatRegistry`]: the first owner attached to a data source starts
//! its emitter, the last one detached stops it.
//!
//! Removing a row (`unregister`, `stop`) waits for an in-flight tick to
//! finish first, so no refresh can resurrect a removed row.

use crate::config::HeartbeatConfig;
use crate::error::StoreError;
use crate::retry::with_retries;
use crate::store::HeartbeatStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of an emitter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitterState {
    Stopped,
    Running,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type OwnerSet = Arc<Mutex<BTreeSet<String>>>;

/// Held for the whole of a tick
type TickLock = Arc<tokio::sync::Mutex<()>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Periodically refreshes the heartbeat rows of registered owners
pub struct HeartbeatEmitter {
    data_source: String,
    store: Arc<dyn HeartbeatStore>,
    config: HeartbeatConfig,
    owners: OwnerSet,
    tick_lock: TickLock,
    running: Mutex<Option<RunningLoop>>,
}

impl HeartbeatEmitter {
    pub fn new(
        data_source: impl Into<String>,
        store: Arc<dyn HeartbeatStore>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            store,
            config,
            owners: Arc::new(Mutex::new(BTreeSet::new())),
            tick_lock: Arc::new(tokio::sync::Mutex::new(())),
            running: Mutex::new(None),
        }
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub fn state(&self) -> EmitterState {
        match lock(&self.running).as_ref() {
            Some(running) if !running.handle.is_finished() => EmitterState::Running,
            _ => EmitterState::Stopped,
        }
    }

    /// Registered owners, sorted
    pub fn owners(&self) -> Vec<String> {
        lock(&self.owners).iter().cloned().collect()
    }

    pub fn is_registered(&self, owner: &str) -> bool {
        lock(&self.owners).contains(owner)
    }

    /// Spawn the refresh loop; no-op when already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat_loop(
            self.data_source.clone(),
            Arc::clone(&self.store),
            self.config.clone(),
            Arc::clone(&self.owners),
            Arc::clone(&self.tick_lock),
            cancel.clone(),
        ));
        *running = Some(RunningLoop { cancel, handle });

        info!(
            data_source = %self.data_source,
            interval = ?self.config.interval,
            "heartbeat emitter started"
        );
    }

    /// Write the owner's row now and refresh it on every tick from here on.
    ///
    /// On failure (after bounded retries) the owner is not registered.
    pub async fn register(&self, owner: &str) -> Result<(), StoreError> {
        lock(&self.owners).insert(owner.to_string());
        if let Err(e) = refresh_owner(&self.store, &self.config, owner).await {
            lock(&self.owners).remove(owner);
            return Err(e);
        }
        debug!(data_source = %self.data_source, owner, "owner registered");
        Ok(())
    }

    /// Stop refreshing the owner and delete its row
    pub async fn unregister(&self, owner: &str) -> Result<bool, StoreError> {
        lock(&self.owners).remove(owner);
        // A tick that already snapshotted this owner must land before the delete
        let _tick = self.tick_lock.lock().await;
        let store = Arc::clone(&self.store);
        let removed = with_retries(
            "heartbeat remove",
            self.config.retry_attempts,
            self.config.retry_delay,
            || store.remove(owner),
        )
        .await?;
        debug!(data_source = %self.data_source, owner, removed, "owner unregistered");
        Ok(removed)
    }

    /// Stop refreshing the owner but leave its row to go stale
    pub fn forget(&self, owner: &str) -> bool {
        let forgotten = lock(&self.owners).remove(owner);
        if forgotten {
            debug!(data_source = %self.data_source, owner, "owner forgotten, row left to expire");
        }
        forgotten
    }

    /// Refresh every registered owner once.
    ///
    /// Returns how many refreshes failed after retries.
    pub async fn tick(&self) -> usize {
        let _tick = self.tick_lock.lock().await;
        refresh_all(&self.data_source, &self.store, &self.config, &self.owners).await
    }

    /// Cancel the loop, wait for it to exit, then remove every registered row
    pub async fn stop(&self) {
        let running = lock(&self.running).take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(data_source = %self.data_source, error = %e, "heartbeat loop ended abnormally");
            }
        }

        let _tick = self.tick_lock.lock().await;
        let owners = std::mem::take(&mut *lock(&self.owners));
        for owner in owners {
            match self.store.remove(&owner) {
                Ok(_) => debug!(data_source = %self.data_source, %owner, "heartbeat row removed"),
                Err(e) => warn!(
                    data_source = %self.data_source,
                    %owner,
                    error = %e,
                    "failed to remove heartbeat row, it will go stale"
                ),
            }
        }

        info!(data_source = %self.data_source, "heartbeat emitter stopped");
    }

    /// Cancel the loop without waiting for it or touching any rows
    pub fn halt(&self) {
        if let Some(running) = lock(&self.running).take() {
            running.cancel.cancel();
            info!(data_source = %self.data_source, "heartbeat emitter halted");
        }
    }
}

impl std::fmt::Debug for HeartbeatEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatEmitter")
            .field("data_source", &self.data_source)
            .field("state", &self.state())
            .field("owners", &self.owners())
            .finish()
    }
}

async fn refresh_owner(
    store: &Arc<dyn HeartbeatStore>,
    config: &HeartbeatConfig,
    owner: &str,
) -> Result<(), StoreError> {
    let interval_millis = config.interval_millis();
    with_retries(
        "heartbeat refresh",
        config.retry_attempts,
        config.retry_delay,
        || store.register_or_refresh(owner, interval_millis),
    )
    .await
}

async fn refresh_all(
    data_source: &str,
    store: &Arc<dyn HeartbeatStore>,
    config: &HeartbeatConfig,
    owners: &OwnerSet,
) -> usize {
    let snapshot: Vec<String> = lock(owners).iter().cloned().collect();
    let mut failures = 0;
    for owner in snapshot {
        if let Err(e) = refresh_owner(store, config, &owner).await {
            failures += 1;
            warn!(data_source, %owner, error = %e, "heartbeat refresh failed");
        }
    }
    failures
}

async fn run_heartbeat_loop(
    data_source: String,
    store: Arc<dyn HeartbeatStore>,
    config: HeartbeatConfig,
    owners: OwnerSet,
    tick_lock: TickLock,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Owners are written on registration; skip the immediate first tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%data_source, "heartbeat loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let _tick = tick_lock.lock().await;
                refresh_all(&data_source, &store, &config, &owners).await;
            }
        }
    }
}

/// Shares one emitter per data source across clients in a process
#[derive(Default)]
pub struct HeartbeatRegistry {
    emitters: Mutex<HashMap<String, Arc<HeartbeatEmitter>>>,
}

impl HeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> Arc<HeartbeatRegistry> {
        static GLOBAL: OnceLock<Arc<HeartbeatRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(HeartbeatRegistry::new())))
    }

    pub fn emitter(&self, data_source: &str) -> Option<Arc<HeartbeatEmitter>> {
        lock(&self.emitters).get(data_source).cloned()
    }

    pub fn data_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.emitters).keys().cloned().collect();
        names.sort();
        names
    }

    /// Register `owner` with the data source's emitter, creating and
    /// starting the emitter when this is its first owner.
    ///
    /// An existing emitter keeps the configuration it was created with.
    pub async fn attach(
        &self,
        data_source: &str,
        store: Arc<dyn HeartbeatStore>,
        config: &HeartbeatConfig,
        owner: &str,
    ) -> Result<Arc<HeartbeatEmitter>, StoreError> {
        let emitter = {
            let mut emitters = lock(&self.emitters);
            let emitter = emitters
                .entry(data_source.to_string())
                .or_insert_with(|| {
                    Arc::new(HeartbeatEmitter::new(data_source, store, config.clone()))
                })
                .clone();
            // Reserve the slot while holding the map lock so a concurrent
            // detach cannot retire this emitter underneath us.
            lock(&emitter.owners).insert(owner.to_string());
            emitter.start();
            emitter
        };

        if let Err(e) = emitter.register(owner).await {
            self.detach(data_source, owner, false).await;
            return Err(e);
        }
        Ok(emitter)
    }

    /// Drop `owner` from the data source's emitter; stops and discards the
    /// emitter once no owners remain.
    ///
    /// With `remove_row` the heartbeat row is deleted, otherwise it is left
    /// behind to go stale.
    pub async fn detach(&self, data_source: &str, owner: &str, remove_row: bool) {
        let Some(emitter) = self.emitter(data_source) else {
            return;
        };

        if remove_row {
            if let Err(e) = emitter.unregister(owner).await {
                warn!(data_source, owner, error = %e, "failed to remove heartbeat row, it will go stale");
            }
        } else {
            emitter.forget(owner);
        }

        if self.retire_if_idle(data_source, &emitter) {
            emitter.stop().await;
        }
    }

    /// Synchronous `detach` that never removes the row, for use from `Drop`.
    ///
    /// An emitter left without owners is halted and discarded.
    pub fn abandon(&self, data_source: &str, owner: &str) {
        let Some(emitter) = self.emitter(data_source) else {
            return;
        };
        emitter.forget(owner);
        if self.retire_if_idle(data_source, &emitter) {
            emitter.halt();
        }
    }

    /// Drop the map entry when `emitter` is still current and has no owners
    fn retire_if_idle(&self, data_source: &str, emitter: &Arc<HeartbeatEmitter>) -> bool {
        let mut emitters = lock(&self.emitters);
        let idle = lock(&emitter.owners).is_empty();
        let current = emitters
            .get(data_source)
            .is_some_and(|e| Arc::ptr_eq(e, emitter));
        if idle && current {
            emitters.remove(data_source);
        }
        idle && current
    }
}

impl std::fmt::Debug for HeartbeatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatRegistry")
            .field("data_sources", &self.data_sources())
            .finish()
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
