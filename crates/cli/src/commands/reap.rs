// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot reaper run

use crate::output;
use crate::Context;
use anyhow::{bail, Result};
use clap::Args;
use relsem_core::{ReapReport, ReapScope, Reaper};
use serde::Serialize;
use std::fmt;

#[derive(Args)]
pub struct ReapArgs {
    /// Only reclaim from these semaphores (repeatable); default is every semaphore
    #[arg(long = "pool")]
    pub pools: Vec<String>,

    /// Grace multiplier for staleness (defaults to the configured one)
    #[arg(long)]
    pub grace: Option<u32>,
}

#[derive(Serialize)]
struct ReapOutput(ReapReport);

impl fmt::Display for ReapOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.0;
        if report.stale_owners.is_empty() {
            return writeln!(f, "No stale owners");
        }
        writeln!(f, "Stale owners: {}", report.stale_owners.len())?;
        for reclaimed in &report.reclaimed {
            writeln!(
                f,
                "  reclaimed {} permits of {} from {}",
                reclaimed.permits, reclaimed.semaphore, reclaimed.owner
            )?;
        }
        for owner in &report.retained_owners {
            writeln!(f, "  kept {} (still holds permits outside scope)", owner)?;
        }
        for owner in &report.failed_owners {
            writeln!(f, "  failed to reap {}", owner)?;
        }
        writeln!(f, "Reclaimed {} permits", report.total_reclaimed())
    }
}

pub fn handle(ctx: &Context, args: ReapArgs) -> Result<()> {
    let grace = args
        .grace
        .unwrap_or(ctx.config.heartbeat.grace_multiplier);
    if grace < 2 {
        bail!("--grace must be at least 2");
    }

    let stores = ctx.stores()?;
    stores.ensure_schema()?;

    let scope = if args.pools.is_empty() {
        ReapScope::All
    } else {
        ReapScope::Pools(args.pools)
    };
    let report = Reaper::for_stores(&stores, grace).run(&scope)?;

    output::print(&ReapOutput(report), ctx.format);
    Ok(())
}
