// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semaphore client
//!
//! A client binds one owner id to one named pool on one data source. The
//! first operation lazily installs the schema, creates the pool and attaches
//! the owner to the data source's heartbeat emitter.
//!
//! `acquire` never awaits in the middle of a store transaction: each attempt
//! is a single synchronous `try_grant`, and the only await points are the
//! backoff sleeps between attempts. Cancelling an acquire (token, `close`, or
//! dropping the future) therefore leaves either a committed grant or nothing.
//!
//! Every store attempt holds a read guard on the client's attempt gate;
//! `close` takes the write guard before returning permits, so a grant that
//! was already in flight is committed first and then handed back by `close`.

use crate::backoff::Backoff;
use crate::clock::{Clock, SystemClock};
use crate::config::RelsemConfig;
use crate::error::{SemaphoreError, StoreError};
use crate::heartbeat::HeartbeatRegistry;
use crate::id::{IdGen, UuidIdGen};
use crate::reaper::{spawn_reaper_task, ReapScope, Reaper};
use crate::retry::with_retries;
use crate::store::Stores;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builder for [`SemaphoreClient`]
pub struct SemaphoreClientBuilder<C: Clock = SystemClock> {
    name: String,
    capacity: u32,
    config: RelsemConfig,
    clock: C,
    owner: Option<String>,
    registry: Option<Arc<HeartbeatRegistry>>,
}

impl SemaphoreClientBuilder<SystemClock> {
    fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            config: RelsemConfig::default(),
            clock: SystemClock,
            owner: None,
            registry: None,
        }
    }
}

impl<C: Clock> SemaphoreClientBuilder<C> {
    pub fn config(mut self, config: RelsemConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for acquire deadlines
    pub fn clock<C2: Clock>(self, clock: C2) -> SemaphoreClientBuilder<C2> {
        SemaphoreClientBuilder {
            name: self.name,
            capacity: self.capacity,
            config: self.config,
            clock,
            owner: self.owner,
            registry: self.registry,
        }
    }

    /// Use a fixed owner id; it must be unique across every process
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn id_gen(mut self, id_gen: &impl IdGen) -> Self {
        self.owner = Some(id_gen.next());
        self
    }

    /// Share emitters through this registry instead of the process-wide one
    pub fn registry(mut self, registry: Arc<HeartbeatRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self, stores: Stores) -> Result<SemaphoreClient<C>, SemaphoreError> {
        if self.name.is_empty() {
            return Err(SemaphoreError::InvalidArgument(
                "semaphore name must not be empty".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(SemaphoreError::InvalidArgument(
                "capacity must be at least 1".to_string(),
            ));
        }
        self.config
            .validate()
            .map_err(|e| SemaphoreError::InvalidArgument(e.to_string()))?;

        let owner = match self.owner {
            Some(owner) if owner.is_empty() => {
                return Err(SemaphoreError::InvalidArgument(
                    "owner id must not be empty".to_string(),
                ))
            }
            Some(owner) => owner,
            None => UuidIdGen.next(),
        };
        let reaper = Arc::new(Reaper::for_stores(
            &stores,
            self.config.heartbeat.grace_multiplier,
        ));

        Ok(SemaphoreClient {
            name: self.name,
            capacity: self.capacity,
            owner,
            config: self.config,
            clock: self.clock,
            stores,
            registry: self.registry.unwrap_or_else(HeartbeatRegistry::global),
            reaper,
            initialized: OnceCell::new(),
            attempts: RwLock::new(()),
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
            background_reaper: Mutex::new(None),
        })
    }
}

/// Distributed counting semaphore bound to one owner and one pool
pub struct SemaphoreClient<C: Clock = SystemClock> {
    name: String,
    capacity: u32,
    owner: String,
    config: RelsemConfig,
    clock: C,
    stores: Stores,
    registry: Arc<HeartbeatRegistry>,
    reaper: Arc<Reaper>,
    initialized: OnceCell<()>,
    /// Read-held by store attempts, write-held by `close`
    attempts: RwLock<()>,
    /// Fires on close; cancels waiting acquires and the background reaper
    closed: CancellationToken,
    closing: AtomicBool,
    background_reaper: Mutex<Option<JoinHandle<()>>>,
}

impl SemaphoreClient<SystemClock> {
    pub fn builder(name: impl Into<String>, capacity: u32) -> SemaphoreClientBuilder<SystemClock> {
        SemaphoreClientBuilder::new(name, capacity)
    }
}

impl<C: Clock> SemaphoreClient<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn data_source(&self) -> &str {
        &self.stores.data_source
    }

    pub fn config(&self) -> &RelsemConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Acquire `permits`, waiting up to `timeout`
    pub async fn acquire(&self, permits: u32, timeout: Duration) -> Result<(), SemaphoreError> {
        self.acquire_with_cancel(permits, timeout, &CancellationToken::new())
            .await
    }

    /// Acquire `permits`, waiting up to `timeout` or until `cancel` fires
    pub async fn acquire_with_cancel(
        &self,
        permits: u32,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), SemaphoreError> {
        self.check_permits(permits)?;
        self.ensure_initialized().await?;

        let start = self.clock.now();
        let deadline = start.checked_add(timeout);
        let mut backoff = Backoff::new(&self.config.backoff);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let attempt = {
                let _gate = self.attempts.read().await;
                if self.closed.is_cancelled() || cancel.is_cancelled() {
                    return Err(SemaphoreError::Cancelled);
                }
                self.stores
                    .semaphores
                    .try_grant(&self.name, &self.owner, permits)
            };
            let last_failure: Option<StoreError> = match attempt {
                Ok(true) => {
                    debug!(
                        semaphore = %self.name,
                        owner = %self.owner,
                        permits,
                        attempts,
                        "permits granted"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    if self.reap_after_denial() {
                        backoff.reset();
                        continue;
                    }
                    None
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        semaphore = %self.name,
                        owner = %self.owner,
                        attempts,
                        error = %e,
                        "acquire attempt failed"
                    );
                    Some(e)
                }
                Err(e) => return Err(e.into()),
            };

            let now = self.clock.now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(match last_failure {
                        Some(e) => SemaphoreError::TransientStoreFailure(e),
                        None => SemaphoreError::TimeoutExceeded {
                            name: self.name.clone(),
                            permits,
                            waited: now.duration_since(start),
                        },
                    });
                }
                Some(deadline) => deadline - now,
                None => Duration::MAX,
            };

            let delay = backoff.next_delay().min(remaining);
            debug!(semaphore = %self.name, permits, delay = ?delay, "waiting for permits");
            tokio::select! {
                _ = self.closed.cancelled() => return Err(SemaphoreError::Cancelled),
                _ = cancel.cancelled() => return Err(SemaphoreError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One grant attempt without waiting or reaping
    pub async fn try_acquire(&self, permits: u32) -> Result<bool, SemaphoreError> {
        self.check_permits(permits)?;
        self.ensure_initialized().await?;

        let granted = {
            let _gate = self.attempts.read().await;
            if self.closed.is_cancelled() {
                return Err(SemaphoreError::Closed);
            }
            self.stores
                .semaphores
                .try_grant(&self.name, &self.owner, permits)?
        };
        debug!(semaphore = %self.name, owner = %self.owner, permits, granted, "try acquire");
        Ok(granted)
    }

    /// Return `permits` to the pool.
    ///
    /// Over-release fails immediately; transient failures are retried a
    /// bounded number of times.
    pub async fn release(&self, permits: u32) -> Result<(), SemaphoreError> {
        if permits == 0 {
            return Err(SemaphoreError::InvalidArgument(
                "cannot release zero permits".to_string(),
            ));
        }
        self.ensure_initialized().await?;

        let _gate = self.attempts.read().await;
        if self.closed.is_cancelled() {
            return Err(SemaphoreError::Closed);
        }
        let semaphores = &self.stores.semaphores;
        with_retries(
            "release",
            self.config.heartbeat.retry_attempts,
            self.config.heartbeat.retry_delay,
            || semaphores.release(&self.name, &self.owner, permits),
        )
        .await?;

        debug!(semaphore = %self.name, owner = %self.owner, permits, "permits released");
        Ok(())
    }

    /// Permits this owner holds, as committed in the store
    pub fn held_permits(&self) -> Result<u32, SemaphoreError> {
        Ok(self
            .stores
            .semaphores
            .held_permits(&self.name, &self.owner)?)
    }

    /// Shut the client down.
    ///
    /// Cancels waiting acquires, stops the background reaper, returns every
    /// held permit and removes the heartbeat row. When permits cannot be
    /// returned the heartbeat row is left to go stale so that a reaper
    /// reclaims them later, and the failure is returned.
    pub async fn close(&self) -> Result<(), SemaphoreError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.closed.cancel();
        self.stop_background_reaper().await;

        // Waits out attempts already inside the store; later ones see `closed`
        let _gate = self.attempts.write().await;
        if self.initialized.get().is_none() {
            debug!(semaphore = %self.name, owner = %self.owner, "closed before first use");
            return Ok(());
        }

        let semaphores = &self.stores.semaphores;
        let released = with_retries(
            "release on close",
            self.config.heartbeat.retry_attempts,
            self.config.heartbeat.retry_delay,
            || semaphores.reclaim(&self.name, &self.owner),
        )
        .await;

        match released {
            Ok(permits) => {
                self.registry
                    .detach(&self.stores.data_source, &self.owner, true)
                    .await;
                info!(
                    semaphore = %self.name,
                    owner = %self.owner,
                    released = permits,
                    "semaphore client closed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    semaphore = %self.name,
                    owner = %self.owner,
                    error = %e,
                    "could not release permits on close, leaving heartbeat to expire"
                );
                self.registry
                    .detach(&self.stores.data_source, &self.owner, false)
                    .await;
                Err(e.into())
            }
        }
    }

    fn check_permits(&self, permits: u32) -> Result<(), SemaphoreError> {
        if permits == 0 {
            return Err(SemaphoreError::InvalidArgument(
                "cannot acquire zero permits".to_string(),
            ));
        }
        if permits > self.capacity {
            return Err(SemaphoreError::InvalidArgument(format!(
                "requested {permits} permits but {} has capacity {}",
                self.name, self.capacity
            )));
        }
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), SemaphoreError> {
        if self.initialized.initialized() {
            return if self.closed.is_cancelled() {
                Err(SemaphoreError::Closed)
            } else {
                Ok(())
            };
        }
        let _gate = self.attempts.read().await;
        if self.closed.is_cancelled() {
            return Err(SemaphoreError::Closed);
        }
        self.initialized
            .get_or_try_init(|| async {
                self.stores.ensure_schema()?;
                self.stores
                    .semaphores
                    .create_pool_if_absent(&self.name, self.capacity)?;
                self.registry
                    .attach(
                        &self.stores.data_source,
                        Arc::clone(&self.stores.heartbeats),
                        &self.config.heartbeat,
                        &self.owner,
                    )
                    .await?;
                self.start_background_reaper();
                info!(
                    semaphore = %self.name,
                    capacity = self.capacity,
                    owner = %self.owner,
                    data_source = %self.stores.data_source,
                    "semaphore client ready"
                );
                Ok::<(), SemaphoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Run the reaper after a denied grant; true when it freed anything
    fn reap_after_denial(&self) -> bool {
        if !self.config.reaper.on_contention {
            return false;
        }
        match self.reaper.run(&ReapScope::pool(self.name.as_str())) {
            Ok(report) => report.reclaimed_any(),
            Err(e) => {
                warn!(semaphore = %self.name, error = %e, "reaper failed during acquire");
                false
            }
        }
    }

    fn start_background_reaper(&self) {
        let Some(interval) = self.config.reaper.interval else {
            return;
        };
        let handle = spawn_reaper_task(
            Arc::clone(&self.reaper),
            ReapScope::pool(self.name.as_str()),
            interval,
            self.closed.child_token(),
        );
        *self
            .background_reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    async fn stop_background_reaper(&self) {
        let handle = self
            .background_reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(semaphore = %self.name, error = %e, "background reaper ended abnormally");
            }
        }
    }
}

impl<C: Clock> Drop for SemaphoreClient<C> {
    fn drop(&mut self) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        // Not closed: stop background work and let the heartbeat go stale
        self.closed.cancel();
        if self.initialized.initialized() {
            self.registry.abandon(&self.stores.data_source, &self.owner);
        }
    }
}

impl<C: Clock> std::fmt::Debug for SemaphoreClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaphoreClient")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("owner", &self.owner)
            .field("data_source", &self.stores.data_source)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
