// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQL text generated from a schema descriptor
//!
//! Identifiers come from a validated [`SchemaDescriptor`], so interpolating
//! them is safe; every value is bound as a parameter.

use relsem_core::SchemaDescriptor;

/// Every statement the store runs, rendered once at open
#[derive(Clone, Debug)]
pub(crate) struct Statements {
    pub heartbeat_ddl: String,
    pub pool_ddl: String,
    pub ledger_ddl: String,

    pub upsert_heartbeat: String,
    pub select_stale_owners: String,
    pub delete_heartbeat: String,
    pub select_heartbeats: String,

    pub insert_pool: String,
    pub select_pool: String,
    pub select_pools: String,
    pub select_available: String,
    pub debit_pool: String,
    pub credit_pool: String,

    pub upsert_grant: String,
    pub select_held: String,
    pub update_held: String,
    pub delete_ledger_entry: String,
    pub select_ledger: String,
    pub select_pools_held_by: String,
}

impl Statements {
    pub fn new(schema: &SchemaDescriptor) -> Self {
        let SchemaDescriptor {
            heartbeat_table: hb,
            heartbeat_owner_column: hb_owner,
            heartbeat_interval_column: hb_interval,
            heartbeat_last_column: hb_last,
            pool_table: pool,
            pool_name_column: pool_name,
            pool_total_column: pool_total,
            pool_available_column: pool_available,
            ledger_table: ledger,
            ledger_semaphore_column: ledger_sem,
            ledger_owner_column: ledger_owner,
            ledger_held_column: ledger_held,
            now_millis_sql: now,
        } = schema;

        Self {
            heartbeat_ddl: format!(
                "CREATE TABLE IF NOT EXISTS {hb} (
                   {hb_owner} TEXT PRIMARY KEY NOT NULL,
                   {hb_interval} INTEGER NOT NULL CHECK ({hb_interval} > 0),
                   {hb_last} INTEGER NOT NULL
                 );"
            ),
            pool_ddl: format!(
                "CREATE TABLE IF NOT EXISTS {pool} (
                   {pool_name} TEXT PRIMARY KEY NOT NULL,
                   {pool_total} INTEGER NOT NULL CHECK ({pool_total} > 0),
                   {pool_available} INTEGER NOT NULL,
                   CHECK ({pool_available} >= 0 AND {pool_available} <= {pool_total})
                 );"
            ),
            ledger_ddl: format!(
                "CREATE TABLE IF NOT EXISTS {ledger} (
                   {ledger_sem} TEXT NOT NULL,
                   {ledger_owner} TEXT NOT NULL,
                   {ledger_held} INTEGER NOT NULL CHECK ({ledger_held} >= 0),
                   PRIMARY KEY ({ledger_sem}, {ledger_owner})
                 );
                 CREATE INDEX IF NOT EXISTS {ledger}_{ledger_owner}_IDX
                   ON {ledger} ({ledger_owner});"
            ),

            upsert_heartbeat: format!(
                "INSERT INTO {hb} ({hb_owner}, {hb_interval}, {hb_last})
                 VALUES (?1, ?2, {now})
                 ON CONFLICT ({hb_owner}) DO UPDATE SET
                   {hb_interval} = excluded.{hb_interval},
                   {hb_last} = excluded.{hb_last}"
            ),
            select_stale_owners: format!(
                "SELECT {hb_owner} FROM {hb}
                 WHERE ({now}) - {hb_last} > {hb_interval} * ?1
                 ORDER BY {hb_owner}"
            ),
            delete_heartbeat: format!("DELETE FROM {hb} WHERE {hb_owner} = ?1"),
            select_heartbeats: format!(
                "SELECT {hb_owner}, {hb_interval}, {hb_last}, ({now}) - {hb_last}
                 FROM {hb} ORDER BY {hb_owner}"
            ),

            insert_pool: format!(
                "INSERT INTO {pool} ({pool_name}, {pool_total}, {pool_available})
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT ({pool_name}) DO NOTHING"
            ),
            select_pool: format!(
                "SELECT {pool_name}, {pool_total}, {pool_available}
                 FROM {pool} WHERE {pool_name} = ?1"
            ),
            select_pools: format!(
                "SELECT {pool_name}, {pool_total}, {pool_available}
                 FROM {pool} ORDER BY {pool_name}"
            ),
            select_available: format!(
                "SELECT {pool_available} FROM {pool} WHERE {pool_name} = ?1"
            ),
            debit_pool: format!(
                "UPDATE {pool} SET {pool_available} = {pool_available} - ?2
                 WHERE {pool_name} = ?1"
            ),
            credit_pool: format!(
                "UPDATE {pool} SET {pool_available} = {pool_available} + ?2
                 WHERE {pool_name} = ?1"
            ),

            upsert_grant: format!(
                "INSERT INTO {ledger} ({ledger_sem}, {ledger_owner}, {ledger_held})
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT ({ledger_sem}, {ledger_owner}) DO UPDATE SET
                   {ledger_held} = {ledger_held} + excluded.{ledger_held}"
            ),
            select_held: format!(
                "SELECT {ledger_held} FROM {ledger}
                 WHERE {ledger_sem} = ?1 AND {ledger_owner} = ?2"
            ),
            update_held: format!(
                "UPDATE {ledger} SET {ledger_held} = ?3
                 WHERE {ledger_sem} = ?1 AND {ledger_owner} = ?2"
            ),
            delete_ledger_entry: format!(
                "DELETE FROM {ledger} WHERE {ledger_sem} = ?1 AND {ledger_owner} = ?2"
            ),
            select_ledger: format!(
                "SELECT {ledger_sem}, {ledger_owner}, {ledger_held}
                 FROM {ledger} WHERE {ledger_sem} = ?1 ORDER BY {ledger_owner}"
            ),
            select_pools_held_by: format!(
                "SELECT {ledger_sem} FROM {ledger}
                 WHERE {ledger_owner} = ?1 AND {ledger_held} > 0
                 ORDER BY {ledger_sem}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_use_descriptor_names() {
        let schema = SchemaDescriptor::default().with_table_prefix("APP_");
        let sql = Statements::new(&schema);

        assert!(sql.heartbeat_ddl.contains("APP_OWNER_HEARTBEAT"));
        assert!(sql.ledger_ddl.contains("APP_SEMAPHORE_LEDGER_OWNER_IDX"));
        assert!(sql.debit_pool.starts_with("UPDATE APP_SEMAPHORE_POOL"));
    }

    #[test]
    fn staleness_uses_store_clock_expression() {
        let schema = SchemaDescriptor::default().with_now_millis_sql("my_now()");
        let sql = Statements::new(&schema);

        assert!(sql.upsert_heartbeat.contains("VALUES (?1, ?2, my_now())"));
        assert!(sql.select_stale_owners.contains("(my_now()) - LAST_HEARTBEAT_INSTANT_MILLIS"));
    }
}
