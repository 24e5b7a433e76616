// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema installation

use crate::output;
use crate::Context;
use anyhow::Result;
use serde::Serialize;
use std::fmt;

#[derive(Serialize)]
struct Initialized {
    data_source: String,
    heartbeat_table: String,
    pool_table: String,
    ledger_table: String,
}

impl fmt::Display for Initialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initialized {}", self.data_source)?;
        writeln!(
            f,
            "  tables: {}, {}, {}",
            self.heartbeat_table, self.pool_table, self.ledger_table
        )
    }
}

pub fn handle(ctx: &Context) -> Result<()> {
    let stores = ctx.stores()?;
    stores.ensure_schema()?;

    let schema = &ctx.config.schema;
    output::print(
        &Initialized {
            data_source: stores.data_source.clone(),
            heartbeat_table: schema.heartbeat_table.clone(),
            pool_table: schema.pool_table.clone(),
            ledger_table: schema.ledger_table.clone(),
        },
        ctx.format,
    );
    Ok(())
}
