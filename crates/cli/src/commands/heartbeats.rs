// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat inspection

use crate::output;
use crate::Context;
use anyhow::Result;
use clap::Args;
use relsem_core::{HeartbeatRecord, HeartbeatStore};
use serde::Serialize;
use std::fmt;

#[derive(Args)]
pub struct HeartbeatsArgs {
    /// Grace multiplier for staleness (defaults to the configured one)
    #[arg(long)]
    pub grace: Option<u32>,
}

#[derive(Serialize)]
struct HeartbeatRow {
    #[serde(flatten)]
    record: HeartbeatRecord,
    stale: bool,
}

impl fmt::Display for HeartbeatRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<48} {:>10} {:>10} {}",
            self.record.owner,
            format!("{}ms", self.record.interval_millis),
            format!("{}ms", self.record.age_millis),
            if self.stale { "stale" } else { "live" }
        )
    }
}

const HEADER: &str = "OWNER                                              INTERVAL        AGE STATE";

pub fn handle(ctx: &Context, args: HeartbeatsArgs) -> Result<()> {
    let store = ctx.open()?;
    HeartbeatStore::ensure_schema(&store)?;

    let grace = args
        .grace
        .unwrap_or(ctx.config.heartbeat.grace_multiplier);
    let rows: Vec<HeartbeatRow> = store
        .heartbeats()?
        .into_iter()
        .map(|record| HeartbeatRow {
            stale: record.is_stale(grace),
            record,
        })
        .collect();

    output::print_list(&rows, HEADER, "No heartbeats", ctx.format);
    Ok(())
}
