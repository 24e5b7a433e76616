// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table and column names for the heartbeat, pool and ledger tables
//!
//! Names are interpolated into SQL, so they are restricted to ASCII
//! alphanumerics and underscores. Deployments with pre-existing tables can
//! point every name at their own schema.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// SQLite expression evaluating to epoch milliseconds
pub const SQLITE_NOW_MILLIS: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

/// Immutable description of the tables the stores operate on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDescriptor {
    pub heartbeat_table: String,
    pub heartbeat_owner_column: String,
    pub heartbeat_interval_column: String,
    pub heartbeat_last_column: String,

    pub pool_table: String,
    pub pool_name_column: String,
    pub pool_total_column: String,
    pub pool_available_column: String,

    pub ledger_table: String,
    pub ledger_semaphore_column: String,
    pub ledger_owner_column: String,
    pub ledger_held_column: String,

    /// Store-side "current time" in epoch milliseconds
    pub now_millis_sql: String,
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self {
            heartbeat_table: "OWNER_HEARTBEAT".to_string(),
            heartbeat_owner_column: "OWNER".to_string(),
            heartbeat_interval_column: "INTERVAL_MILLIS".to_string(),
            heartbeat_last_column: "LAST_HEARTBEAT_INSTANT_MILLIS".to_string(),
            pool_table: "SEMAPHORE_POOL".to_string(),
            pool_name_column: "NAME".to_string(),
            pool_total_column: "TOTAL_PERMITS".to_string(),
            pool_available_column: "AVAILABLE_PERMITS".to_string(),
            ledger_table: "SEMAPHORE_LEDGER".to_string(),
            ledger_semaphore_column: "SEMAPHORE_NAME".to_string(),
            ledger_owner_column: "OWNER".to_string(),
            ledger_held_column: "HELD_PERMITS".to_string(),
            now_millis_sql: SQLITE_NOW_MILLIS.to_string(),
        }
    }
}

impl SchemaDescriptor {
    /// Use a dialect-specific "current time" expression
    pub fn with_now_millis_sql(mut self, expression: impl Into<String>) -> Self {
        self.now_millis_sql = expression.into();
        self
    }

    /// Prefix every table name, e.g. to run several deployments in one database
    pub fn with_table_prefix(mut self, prefix: &str) -> Self {
        self.heartbeat_table = format!("{prefix}{}", self.heartbeat_table);
        self.pool_table = format!("{prefix}{}", self.pool_table);
        self.ledger_table = format!("{prefix}{}", self.ledger_table);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let identifiers = [
            ("heartbeat_table", &self.heartbeat_table),
            ("heartbeat_owner_column", &self.heartbeat_owner_column),
            ("heartbeat_interval_column", &self.heartbeat_interval_column),
            ("heartbeat_last_column", &self.heartbeat_last_column),
            ("pool_table", &self.pool_table),
            ("pool_name_column", &self.pool_name_column),
            ("pool_total_column", &self.pool_total_column),
            ("pool_available_column", &self.pool_available_column),
            ("ledger_table", &self.ledger_table),
            ("ledger_semaphore_column", &self.ledger_semaphore_column),
            ("ledger_owner_column", &self.ledger_owner_column),
            ("ledger_held_column", &self.ledger_held_column),
        ];
        for (field, value) in identifiers {
            if !is_identifier(value) {
                return Err(StoreError::InvalidSchema(format!(
                    "{field} must be a non-empty [A-Za-z0-9_] identifier, got {value:?}"
                )));
            }
        }

        let tables = [&self.heartbeat_table, &self.pool_table, &self.ledger_table];
        for (i, a) in tables.iter().enumerate() {
            if tables[i + 1..].iter().any(|b| a.eq_ignore_ascii_case(b)) {
                return Err(StoreError::InvalidSchema(format!(
                    "table name {a} is used twice"
                )));
            }
        }

        if self.now_millis_sql.trim().is_empty() {
            return Err(StoreError::InvalidSchema(
                "now_millis_sql must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with(|c: char| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
