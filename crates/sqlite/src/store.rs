// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed heartbeat and semaphore store
//!
//! Every mutation runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock before the first read. That gives the same guarantee
//! as `SELECT ... FOR UPDATE` on a row-locking database: the balance a
//! transaction reads cannot change before it commits. Waiting for the lock
//! is bounded by the connection's busy timeout.

use crate::sql::Statements;
use relsem_core::{
    HeartbeatRecord, HeartbeatStore, PermitLedgerEntry, SchemaDescriptor, SemaphorePool,
    SemaphoreStore, StoreError, Stores,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// How long a statement waits for another connection's write lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat and semaphore store over one SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    sql: Statements,
    data_source: String,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path, schema: SchemaDescriptor) -> Result<Self, StoreError> {
        schema.validate()?;
        let conn = Connection::open(path).map_err(store_error)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .map_err(store_error)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(store_error)?;

        let data_source = std::fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        debug!(%data_source, "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            sql: Statements::new(&schema),
            data_source,
        })
    }

    /// Private in-memory database; every call creates a distinct data source
    pub fn open_in_memory(schema: SchemaDescriptor) -> Result<Self, StoreError> {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        schema.validate()?;
        let conn = Connection::open_in_memory().map_err(store_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
            sql: Statements::new(&schema),
            data_source: format!(":memory:{}", NEXT.fetch_add(1, Ordering::Relaxed)),
        })
    }

    /// Stable identity of the database (its canonical path)
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        self.lock().busy_timeout(timeout).map_err(store_error)
    }

    /// Both store roles of this database, for building clients
    pub fn into_stores(self) -> Stores {
        let data_source = self.data_source.clone();
        Stores::shared(data_source, Arc::new(self))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn install(&self, ddl: &str) -> Result<(), StoreError> {
        self.lock().execute_batch(ddl).map_err(store_error)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("data_source", &self.data_source)
            .finish_non_exhaustive()
    }
}

/// Classify a driver error: lock contention and I/O are `Unavailable`,
/// anything else is `Backend`. Both count as transient.
pub(crate) fn store_error(err: rusqlite::Error) -> StoreError {
    let unavailable = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
        ),
        _ => false,
    };
    if unavailable {
        StoreError::Unavailable(Box::new(err))
    } else {
        StoreError::Backend(Box::new(err))
    }
}

fn to_sql_count(permits: u32) -> i64 {
    i64::from(permits)
}

fn from_sql_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl HeartbeatStore for SqliteStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.install(&self.sql.heartbeat_ddl)
    }

    fn register_or_refresh(&self, owner: &str, interval_millis: i64) -> Result<(), StoreError> {
        self.lock()
            .execute(&self.sql.upsert_heartbeat, params![owner, interval_millis])
            .map_err(store_error)?;
        Ok(())
    }

    fn list_stale_owners(&self, grace_multiplier: u32) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&self.sql.select_stale_owners)
            .map_err(store_error)?;
        let owners = stmt
            .query_map(params![i64::from(grace_multiplier)], |row| row.get(0))
            .map_err(store_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_error)?;
        Ok(owners)
    }

    fn remove(&self, owner: &str) -> Result<bool, StoreError> {
        let deleted = self
            .lock()
            .execute(&self.sql.delete_heartbeat, params![owner])
            .map_err(store_error)?;
        Ok(deleted > 0)
    }

    fn heartbeats(&self) -> Result<Vec<HeartbeatRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&self.sql.select_heartbeats)
            .map_err(store_error)?;
        let records = stmt
            .query_map([], |row| {
                Ok(HeartbeatRecord {
                    owner: row.get(0)?,
                    interval_millis: row.get(1)?,
                    last_heartbeat_millis: row.get(2)?,
                    age_millis: row.get(3)?,
                })
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(records)
    }
}

impl SemaphoreStore for SqliteStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.install(&self.sql.pool_ddl)?;
        self.install(&self.sql.ledger_ddl)
    }

    fn create_pool_if_absent(&self, name: &str, total_permits: u32) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;

        let inserted = tx
            .execute(&self.sql.insert_pool, params![name, to_sql_count(total_permits)])
            .map_err(store_error)?;
        let existing: i64 = tx
            .query_row(&self.sql.select_pool, params![name], |row| row.get(1))
            .map_err(store_error)?;
        let existing = from_sql_count(existing);
        if existing != total_permits {
            return Err(StoreError::CapacityConflict {
                name: name.to_string(),
                existing,
                requested: total_permits,
            });
        }

        tx.commit().map_err(store_error)?;
        if inserted > 0 {
            info!(semaphore = name, permits = total_permits, "created semaphore pool");
        }
        Ok(())
    }

    fn try_grant(&self, name: &str, owner: &str, permits: u32) -> Result<bool, StoreError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;

        let available: Option<i64> = tx
            .query_row(&self.sql.select_available, params![name], |row| row.get(0))
            .optional()
            .map_err(store_error)?;
        let Some(available) = available else {
            return Err(StoreError::UnknownPool(name.to_string()));
        };
        if available < to_sql_count(permits) {
            // dropping the transaction rolls it back
            return Ok(false);
        }

        tx.execute(&self.sql.debit_pool, params![name, to_sql_count(permits)])
            .map_err(store_error)?;
        tx.execute(
            &self.sql.upsert_grant,
            params![name, owner, to_sql_count(permits)],
        )
        .map_err(store_error)?;
        tx.commit().map_err(store_error)?;
        Ok(true)
    }

    fn release(&self, name: &str, owner: &str, permits: u32) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;

        let exists = tx
            .query_row(&self.sql.select_available, params![name], |_| Ok(()))
            .optional()
            .map_err(store_error)?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownPool(name.to_string()));
        }

        let held: Option<i64> = tx
            .query_row(&self.sql.select_held, params![name, owner], |row| row.get(0))
            .optional()
            .map_err(store_error)?;
        let held = held.map(from_sql_count).unwrap_or(0);
        if permits > held {
            return Err(StoreError::OverRelease {
                name: name.to_string(),
                owner: owner.to_string(),
                requested: permits,
                held,
            });
        }

        if permits == held {
            tx.execute(&self.sql.delete_ledger_entry, params![name, owner])
                .map_err(store_error)?;
        } else {
            tx.execute(
                &self.sql.update_held,
                params![name, owner, to_sql_count(held - permits)],
            )
            .map_err(store_error)?;
        }
        tx.execute(&self.sql.credit_pool, params![name, to_sql_count(permits)])
            .map_err(store_error)?;
        tx.commit().map_err(store_error)
    }

    fn reclaim(&self, name: &str, owner: &str) -> Result<u32, StoreError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_error)?;

        let held: Option<i64> = tx
            .query_row(&self.sql.select_held, params![name, owner], |row| row.get(0))
            .optional()
            .map_err(store_error)?;
        let Some(held) = held else {
            return Ok(0);
        };

        tx.execute(&self.sql.delete_ledger_entry, params![name, owner])
            .map_err(store_error)?;
        tx.execute(&self.sql.credit_pool, params![name, held])
            .map_err(store_error)?;
        tx.commit().map_err(store_error)?;
        Ok(from_sql_count(held))
    }

    fn pool(&self, name: &str) -> Result<Option<SemaphorePool>, StoreError> {
        self.lock()
            .query_row(&self.sql.select_pool, params![name], pool_from_row)
            .optional()
            .map_err(store_error)
    }

    fn pools(&self) -> Result<Vec<SemaphorePool>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&self.sql.select_pools)
            .map_err(store_error)?;
        let pools = stmt
            .query_map([], pool_from_row)
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(pools)
    }

    fn ledger(&self, name: &str) -> Result<Vec<PermitLedgerEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&self.sql.select_ledger)
            .map_err(store_error)?;
        let entries = stmt
            .query_map(params![name], |row| {
                Ok(PermitLedgerEntry {
                    semaphore_name: row.get(0)?,
                    owner: row.get(1)?,
                    held_permits: from_sql_count(row.get(2)?),
                })
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(entries)
    }

    fn held_permits(&self, name: &str, owner: &str) -> Result<u32, StoreError> {
        let held: Option<i64> = self
            .lock()
            .query_row(&self.sql.select_held, params![name, owner], |row| row.get(0))
            .optional()
            .map_err(store_error)?;
        Ok(held.map(from_sql_count).unwrap_or(0))
    }

    fn pools_held_by(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(&self.sql.select_pools_held_by)
            .map_err(store_error)?;
        let names = stmt
            .query_map(params![owner], |row| row.get(0))
            .map_err(store_error)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(store_error)?;
        Ok(names)
    }
}

fn pool_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SemaphorePool> {
    Ok(SemaphorePool {
        name: row.get(0)?,
        total_permits: from_sql_count(row.get(1)?),
        available_permits: from_sql_count(row.get(2)?),
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
