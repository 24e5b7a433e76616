// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relsem - administer semaphores shared through a SQLite database

mod commands;
mod completions;
mod error;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use commands::{heartbeats, hold, init, pool, reap};
use output::OutputFormat;
use relsem_core::{RelsemConfig, Stores};
use relsem_sqlite::SqliteStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relsem",
    version,
    about = "Counting semaphores shared through a relational database"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "RELSEM_DB", default_value = "relsem.db")]
    db: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true, env = "RELSEM_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the semaphore tables
    Init,
    /// Semaphore pool management
    Pool(pool::PoolArgs),
    /// List owner heartbeats and their staleness
    Heartbeats(heartbeats::HeartbeatsArgs),
    /// Reclaim permits held by stale owners
    Reap(reap::ReapArgs),
    /// Acquire permits and hold them until interrupted
    Hold(hold::HoldArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Everything a command needs to reach the database
pub struct Context {
    pub db: PathBuf,
    pub config: RelsemConfig,
    pub format: OutputFormat,
}

impl Context {
    pub fn open(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db, self.config.schema.clone())
            .with_context(|| format!("failed to open database {}", self.db.display()))
    }

    pub fn stores(&self) -> Result<Stores> {
        Ok(self.open()?.into_stores())
    }
}

#[tokio::main]
async fn main() {
    setup_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<error::CliError>() {
            Some(cli_error) => eprint!("error: {}", cli_error),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = cli.command {
        completions::generate_completions::<Cli>(args.shell);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => RelsemConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RelsemConfig::default(),
    };
    let ctx = Context {
        db: cli.db,
        config,
        format: cli.format,
    };

    match cli.command {
        Commands::Init => init::handle(&ctx),
        Commands::Pool(args) => pool::handle(&ctx, args),
        Commands::Heartbeats(args) => heartbeats::handle(&ctx, args),
        Commands::Reap(args) => reap::handle(&ctx, args),
        Commands::Hold(args) => hold::handle(&ctx, args).await,
        Commands::Completions(_) => Ok(()),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `warn` level
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
