//! Team CLI - inspect and change repository provider mappings.
//!
//! The workspace comes from a JSON manifest; mapping markers live in a
//! SQLite property store, so they persist between invocations.

mod commands;
mod providers;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use team_core::{MappingOptions, SqlitePropertyStore};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "team")]
#[command(about = "Map workspace projects to repository providers")]
struct Args {
    /// Workspace manifest (JSON)
    #[arg(short, long, default_value = "workspace.json")]
    workspace: PathBuf,

    /// Property database (defaults to the platform config directory)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Provider manifest replacing the built-in providers
    #[arg(long)]
    providers: Option<PathBuf>,

    /// Give up waiting for a busy project after this many milliseconds
    #[arg(long)]
    wait_ms: Option<u64>,

    /// Skip nature-based discovery of legacy providers
    #[arg(long)]
    no_legacy: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every known provider type
    Providers,
    /// Show the mapping of one project, or of all of them
    Status { project: Option<String> },
    /// Map a project to a provider
    Map { project: String, id: String },
    /// Remove a project's provider mapping
    Unmap { project: String },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let store_path = match args.store {
        Some(path) => path,
        None => SqlitePropertyStore::default_path().context("No default store location")?,
    };
    debug!("Property store: {}", store_path.display());
    let store = SqlitePropertyStore::open_at(&store_path)
        .with_context(|| format!("Failed to open {}", store_path.display()))?;

    let registry = providers::registry(args.providers.as_deref())
        .context("Failed to load provider registry")?;
    let options = MappingOptions {
        legacy_nature_lookup: !args.no_legacy,
        rule_wait_timeout: args.wait_ms.map(Duration::from_millis),
    };
    let session = commands::Session::load(&args.workspace, Arc::new(store), registry, options)?;

    let output = match &args.command {
        Command::Providers => commands::providers(&session),
        Command::Status { project } => commands::status(&session, project.as_deref())?,
        Command::Map { project, id } => commands::map(&session, project, id)?,
        Command::Unmap { project } => commands::unmap(&session, project)?,
    };

    // Intentional stdout: the command result
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
