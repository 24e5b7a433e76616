// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale-owner reclaim
//!
//! The reaper holds no state of its own. Every step (reclaim per pool, then
//! removal of the heartbeat row) is idempotent, so any number of reapers in
//! any number of processes may run at once.

use crate::error::StoreError;
use crate::store::{HeartbeatStore, SemaphoreStore, Stores};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which pools a reaper reclaims from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReapScope {
    /// Only the named pools
    Pools(Vec<String>),
    /// Every pool the stale owner holds permits on
    All,
}

impl ReapScope {
    pub fn pool(name: impl Into<String>) -> Self {
        Self::Pools(vec![name.into()])
    }
}

/// Permits returned to one pool from one stale owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reclaimed {
    pub owner: String,
    pub semaphore: String,
    pub permits: u32,
}

/// Outcome of one reaper pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub stale_owners: Vec<String>,
    pub reclaimed: Vec<Reclaimed>,
    /// Stale owners whose heartbeat row was deleted
    pub removed_owners: Vec<String>,
    /// Stale owners left in place because they still hold permits outside the scope
    pub retained_owners: Vec<String>,
    /// Stale owners whose reclaim hit a store error; retried on the next pass
    pub failed_owners: Vec<String>,
}

impl ReapReport {
    pub fn total_reclaimed(&self) -> u32 {
        self.reclaimed.iter().map(|r| r.permits).sum()
    }

    pub fn reclaimed_any(&self) -> bool {
        self.total_reclaimed() > 0
    }
}

pub struct Reaper {
    heartbeats: Arc<dyn HeartbeatStore>,
    semaphores: Arc<dyn SemaphoreStore>,
    grace_multiplier: u32,
}

impl Reaper {
    pub fn new(
        heartbeats: Arc<dyn HeartbeatStore>,
        semaphores: Arc<dyn SemaphoreStore>,
        grace_multiplier: u32,
    ) -> Self {
        Self {
            heartbeats,
            semaphores,
            grace_multiplier,
        }
    }

    pub fn for_stores(stores: &Stores, grace_multiplier: u32) -> Self {
        Self::new(
            Arc::clone(&stores.heartbeats),
            Arc::clone(&stores.semaphores),
            grace_multiplier,
        )
    }

    pub fn grace_multiplier(&self) -> u32 {
        self.grace_multiplier
    }

    /// Reclaim every stale owner's permits within `scope`.
    ///
    /// Fails only when the stale owners cannot be listed; per-owner failures
    /// are logged and reported in [`ReapReport::failed_owners`].
    pub fn run(&self, scope: &ReapScope) -> Result<ReapReport, StoreError> {
        let stale = self.heartbeats.list_stale_owners(self.grace_multiplier)?;
        let mut report = ReapReport {
            stale_owners: stale.clone(),
            ..ReapReport::default()
        };

        for owner in stale {
            match self.reap_owner(&owner, scope, &mut report) {
                Ok(true) => report.removed_owners.push(owner),
                Ok(false) => report.retained_owners.push(owner),
                Err(e) => {
                    warn!(%owner, error = %e, "failed to reap stale owner");
                    report.failed_owners.push(owner);
                }
            }
        }

        if !report.stale_owners.is_empty() {
            debug!(
                stale = report.stale_owners.len(),
                reclaimed = report.total_reclaimed(),
                removed = report.removed_owners.len(),
                "reaper pass complete"
            );
        }
        Ok(report)
    }

    /// Returns whether the owner's heartbeat row was removed
    fn reap_owner(
        &self,
        owner: &str,
        scope: &ReapScope,
        report: &mut ReapReport,
    ) -> Result<bool, StoreError> {
        let pools = match scope {
            ReapScope::Pools(names) => names.clone(),
            ReapScope::All => self.semaphores.pools_held_by(owner)?,
        };

        for semaphore in pools {
            let permits = self.semaphores.reclaim(&semaphore, owner)?;
            if permits > 0 {
                info!(owner, %semaphore, reclaimed = permits, "reclaimed permits from stale owner");
                report.reclaimed.push(Reclaimed {
                    owner: owner.to_string(),
                    semaphore,
                    permits,
                });
            }
        }

        let remaining = self.semaphores.pools_held_by(owner)?;
        if !remaining.is_empty() {
            debug!(owner, pools = ?remaining, "stale owner still holds permits outside scope");
            return Ok(false);
        }
        self.heartbeats.remove(owner)?;
        Ok(true)
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("grace_multiplier", &self.grace_multiplier)
            .finish_non_exhaustive()
    }
}

/// Run the reaper every `interval` until `cancel` fires.
///
/// A pass already in progress completes before the task exits.
pub fn spawn_reaper_task(
    reaper: Arc<Reaper>,
    scope: ReapScope,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?interval, "reaper task started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reaper task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = reaper.run(&scope) {
                        warn!(error = %e, "reaper pass failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
