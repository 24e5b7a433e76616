// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acquire permits and keep them (with a live heartbeat) until interrupted

use crate::error::CliError;
use crate::output;
use crate::Context;
use anyhow::Result;
use clap::Args;
use relsem_core::{CancellationToken, SemaphoreClient};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Args)]
pub struct HoldArgs {
    /// Semaphore name
    pub name: String,

    /// Permits to acquire
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub permits: u32,

    /// Capacity of the semaphore; read from the database when omitted
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub capacity: Option<u32>,

    /// How long to wait for permits (e.g. 500ms, 10s)
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Release after this long instead of waiting for Ctrl-C
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Serialize)]
struct Held<'a> {
    semaphore: &'a str,
    owner: &'a str,
    permits: u32,
}

impl fmt::Display for Held<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Holding {} permits of {} as {}",
            self.permits, self.semaphore, self.owner
        )
    }
}

pub async fn handle(ctx: &Context, args: HoldArgs) -> Result<()> {
    let stores = ctx.stores()?;

    let capacity = match args.capacity {
        Some(capacity) => capacity,
        None => {
            stores.semaphores.ensure_schema()?;
            stores
                .semaphores
                .pool(&args.name)?
                .map(|pool| pool.total_permits)
                .ok_or_else(|| CliError::capacity_required(&args.name))?
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReleasing permits...");
        on_interrupt.cancel();
    })?;

    let client = SemaphoreClient::builder(&args.name, capacity)
        .config(ctx.config.clone())
        .build(stores)
        .map_err(|e| CliError::acquire_failed(&args.name, e))?;

    if let Err(e) = client
        .acquire_with_cancel(args.permits, args.timeout, &cancel)
        .await
    {
        // Drop the heartbeat row right away instead of letting it go stale
        if let Err(close_err) = client.close().await {
            tracing::warn!(semaphore = %args.name, error = %close_err, "close after failed acquire");
        }
        return Err(CliError::acquire_failed(&args.name, e).into());
    }

    output::print(
        &Held {
            semaphore: client.name(),
            owner: client.owner(),
            permits: args.permits,
        },
        ctx.format,
    );

    match args.duration {
        Some(duration) => {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => {}
            }
        }
        None => cancel.cancelled().await,
    }

    client.close().await?;
    tracing::info!(semaphore = %args.name, permits = args.permits, "released held permits");
    Ok(())
}
