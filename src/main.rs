//! Command-line interface for dirsync
//!
//! # Usage Examples
//!
//! ```bash
//! # Replay change events captured by the database triggers
//! dirsync apply --config dirsync.yaml --events events.jsonl
//!
//! # Backfill the directory from the current table contents
//! DIRSYNC_BIND_PASSWORD=secret dirsync initial-sync \
//!   --config dirsync.yaml \
//!   --table users --table aliases
//!
//! # Validate a configuration and list its bindings
//! dirsync check --config dirsync.yaml
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=dirsync=info,sync_core=debug`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dirsync::initial_sync::initial_sync;
use dirsync::replay::{read_events, replay_events};
use dirsync::{ConfigOpts, SyncConfig};
use dirsync_ldap_sink::LdapConnector;
use dirsync_postgresql_source::PostgresSource;
use std::path::PathBuf;
use std::sync::Arc;
use sync_core::Dispatcher;
use tracing::info;

#[derive(Parser)]
#[command(name = "dirsync")]
#[command(about = "Propagates relational row changes into an LDAP directory")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch change events read from a JSON lines file
    Apply {
        #[command(flatten)]
        opts: ConfigOpts,

        /// Newline-delimited JSON change events
        #[arg(long)]
        events: PathBuf,
    },

    /// Dispatch a CREATE event for every existing row of bound tables
    InitialSync {
        #[command(flatten)]
        opts: ConfigOpts,

        /// Table to backfill (repeatable); defaults to every bound table
        #[arg(long = "table", value_name = "TABLE")]
        tables: Vec<String>,
    },

    /// Validate the configuration and print its bindings
    Check {
        #[command(flatten)]
        opts: ConfigOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply { opts, events } => {
            let config = opts.load()?;
            let events = read_events(&events)?;
            let dispatcher = build_dispatcher(&config)?;
            let mut source = connect_source(&config).await?;

            let summary = replay_events(&dispatcher, events, &mut source).await?;
            info!(
                "applied {} event(s) with {} handler run(s)",
                summary.events, summary.handler_runs
            );
        }
        Commands::InitialSync { opts, tables } => {
            let config = opts.load()?;
            let dispatcher = build_dispatcher(&config)?;
            let mut source = connect_source(&config).await?;

            let tables = if tables.is_empty() {
                config.bound_tables().into_iter().map(str::to_string).collect()
            } else {
                tables
            };
            for table in &tables {
                let rows = initial_sync(&dispatcher, table, &mut source).await?;
                info!("synchronized {rows} row(s) of {table}");
            }
        }
        Commands::Check { opts } => {
            let config = opts.load()?;
            config.build_bindings()?;
            println!("{}: ok", opts.config.display());
            for binding in &config.bindings {
                println!(
                    "  {} -> {} (model {})",
                    binding.table,
                    binding.handler.type_name(),
                    binding.handler.model()
                );
            }
        }
    }

    Ok(())
}

fn build_dispatcher(config: &SyncConfig) -> anyhow::Result<Dispatcher> {
    let bindings = config
        .build_bindings()
        .context("Failed to build handlers")?;
    Ok(Dispatcher::new(
        Arc::new(LdapConnector::new()),
        config.directory.clone(),
        bindings,
    ))
}

async fn connect_source(config: &SyncConfig) -> anyhow::Result<PostgresSource> {
    let connection_string = config.connection_string()?;
    PostgresSource::connect(connection_string)
        .await
        .context("Failed to connect to the relational source")
}
