// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool commands

use crate::error::CliError;
use crate::output;
use crate::Context;
use anyhow::Result;
use clap::{Args, Subcommand};
use relsem_core::{PermitLedgerEntry, SemaphorePool, SemaphoreStore};
use serde::Serialize;
use std::fmt;

#[derive(Args)]
pub struct PoolArgs {
    #[command(subcommand)]
    pub command: PoolCommand,
}

#[derive(Subcommand)]
pub enum PoolCommand {
    /// Create a semaphore with a fixed number of permits
    Create {
        /// Semaphore name
        name: String,
        /// Total permits
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        permits: u32,
    },
    /// List all semaphores
    List,
    /// Show a semaphore and who holds its permits
    Show {
        /// Semaphore name
        name: String,
    },
}

#[derive(Serialize)]
struct PoolRow(SemaphorePool);

impl fmt::Display for PoolRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:>6} {:>10} {:>8}",
            self.0.name,
            self.0.total_permits,
            self.0.available_permits,
            self.0.checked_out()
        )
    }
}

const POOL_HEADER: &str = "NAME                      TOTAL  AVAILABLE     HELD";

#[derive(Serialize)]
struct PoolDetail {
    pool: SemaphorePool,
    ledger: Vec<PermitLedgerEntry>,
    /// available + sum(held) == total
    consistent: bool,
}

impl fmt::Display for PoolDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Semaphore: {}", self.pool.name)?;
        writeln!(f, "  Total: {}", self.pool.total_permits)?;
        writeln!(f, "  Available: {}", self.pool.available_permits)?;
        if self.ledger.is_empty() {
            writeln!(f, "  Holders: none")?;
        } else {
            writeln!(f, "  Holders:")?;
            for entry in &self.ledger {
                writeln!(f, "    {:<40} {}", entry.owner, entry.held_permits)?;
            }
        }
        if self.consistent {
            writeln!(f, "  Accounting: consistent")
        } else {
            writeln!(f, "  Accounting: INCONSISTENT")
        }
    }
}

pub fn handle(ctx: &Context, args: PoolArgs) -> Result<()> {
    let store = ctx.open()?;
    SemaphoreStore::ensure_schema(&store)?;

    match args.command {
        PoolCommand::Create { name, permits } => {
            store.create_pool_if_absent(&name, permits)?;
            let pool = store
                .pool(&name)?
                .ok_or_else(|| CliError::pool_not_found(&name, &ctx.db))?;
            output::print(&Created(pool), ctx.format);
        }
        PoolCommand::List => {
            let pools: Vec<PoolRow> = store.pools()?.into_iter().map(PoolRow).collect();
            output::print_list(&pools, POOL_HEADER, "No semaphores", ctx.format);
        }
        PoolCommand::Show { name } => {
            let pool = store
                .pool(&name)?
                .ok_or_else(|| CliError::pool_not_found(&name, &ctx.db))?;
            let ledger = store.ledger(&name)?;
            let held: u64 = ledger.iter().map(|e| u64::from(e.held_permits)).sum();
            let consistent = u64::from(pool.available_permits) + held
                == u64::from(pool.total_permits);
            output::print(
                &PoolDetail {
                    pool,
                    ledger,
                    consistent,
                },
                ctx.format,
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Created(SemaphorePool);

impl fmt::Display for Created {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Semaphore {} ready with {} permits",
            self.0.name, self.0.total_permits
        )
    }
}
