//! # snapcas
//!
//! A content-addressed, deduplicating snapshot backup engine for local
//! directory trees. Every file's bytes are hashed with SHA-256 and stored
//! once in a SQLite-backed catalog; snapshots reference that catalog by
//! digest rather than copying bytes, so repeated backups of a mostly
//! unchanged tree cost almost nothing in storage.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │  CLI (clap)  │
//!                    └──────┬──────┘
//!                           │
//!                           ▼
//!                   ┌───────────────┐
//!                   │ BackupEngine  │
//!                   └───────┬───────┘
//!              ┌────────────┼────────────┬─────────────┐
//!              ▼            ▼            ▼             ▼
//!        ┌──────────┐ ┌───────────┐ ┌─────────┐  ┌───────────┐
//!        │ Sha256   │ │FileSystem │ │  Store  │  │ EventSink │
//!        │ Computer │ │  Gateway  │ │(SQLite) │  │(tracing/  │
//!        └──────────┘ └───────────┘ └─────────┘  │ indicatif)│
//!                                                  └───────────┘
//! ```

mod catalog;
mod engine;
mod error;
mod events;
mod fs_gateway;
mod hasher;
mod model;
mod snapshot_index;
mod store;

use clap::{Parser, Subcommand};
use engine::BackupEngine;
use events::CliEventSink;
use fs_gateway::RealFileSystemGateway;
use hasher::Sha256Computer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::Store;

/// snapcas — content-addressed, deduplicating snapshot backups
#[derive(Parser, Debug)]
#[command(
    name = "snapcas",
    version,
    about = "Content-addressed, deduplicating snapshot backup engine",
    long_about = "snapcas hashes every file with SHA-256, stores each unique byte \
                  sequence exactly once in a SQLite catalog, and records snapshots \
                  as lightweight references into that catalog. Unchanged files across \
                  snapshots cost no additional storage."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the snapcas catalog database
    #[arg(long, global = true, default_value = "backup.db")]
    db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take a new snapshot of a directory tree
    Snapshot {
        /// Directory to snapshot
        #[arg(short = 'd', long)]
        target_directory: PathBuf,
    },

    /// List all snapshots with storage accounting
    List,

    /// Restore a snapshot's files into a directory
    Restore {
        /// Snapshot id to restore
        #[arg(short = 'n', long)]
        snapshot_number: i64,

        /// Directory to restore into
        #[arg(short, long)]
        output_directory: PathBuf,

        /// Create the output directory if it does not exist
        #[arg(short, long)]
        create_directory: bool,
    },

    /// Delete a snapshot and reclaim any content it alone referenced
    Prune {
        /// Snapshot id to delete
        #[arg(short, long)]
        snapshot: i64,
    },

    /// Verify every referenced blob still matches its recorded digest
    Check,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", colored::Colorize::red("error:"), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> error::Result<()> {
    match &cli.command {
        Command::Snapshot { target_directory } => cmd_snapshot(&cli, target_directory),
        Command::List => cmd_list(&cli),
        Command::Restore {
            snapshot_number,
            output_directory,
            create_directory,
        } => cmd_restore(&cli, *snapshot_number, output_directory, *create_directory),
        Command::Prune { snapshot } => cmd_prune(&cli, *snapshot),
        Command::Check => cmd_check(&cli),
    }
}

fn open_engine(cli: &Cli) -> error::Result<BackupEngine<RealFileSystemGateway>> {
    let store = Store::open(&cli.db)?;
    Ok(BackupEngine::new(
        Sha256Computer,
        RealFileSystemGateway,
        store,
        Arc::new(CliEventSink::new()),
    ))
}

fn cmd_snapshot(cli: &Cli, target_directory: &Path) -> error::Result<()> {
    let mut engine = open_engine(cli)?;
    let id = engine.snapshot(target_directory)?;
    println!("created snapshot {id}");
    Ok(())
}

fn cmd_list(cli: &Cli) -> error::Result<()> {
    let engine = open_engine(cli)?;
    let (listings, total) = engine.list()?;

    if listings.is_empty() {
        println!("no snapshots");
        return Ok(());
    }

    println!(
        "{:>8}  {:19}  {:>12}  {:>14}  {}",
        "SNAPSHOT", "TIMESTAMP", "SIZE", "DISTINCT_SIZE", "SOURCE"
    );
    for listing in &listings {
        println!(
            "{:>8}  {:19}  {:>12}  {:>14}  {}",
            listing.id,
            listing.created_at.format("%Y-%m-%d %H:%M:%S"),
            listing.total_size,
            listing.distinct_size,
            listing.source_root,
        );
    }
    println!();
    println!("total {total}");

    Ok(())
}

fn cmd_restore(
    cli: &Cli,
    snapshot_number: i64,
    output_directory: &Path,
    create_directory: bool,
) -> error::Result<()> {
    if create_directory && !output_directory.exists() {
        std::fs::create_dir_all(output_directory).map_err(|e| error::SnapcasError::WriteFailed {
            path: output_directory.to_path_buf(),
            source: e,
        })?;
    }

    let engine = open_engine(cli)?;
    engine.restore(snapshot_number, output_directory)?;
    Ok(())
}

fn cmd_prune(cli: &Cli, snapshot: i64) -> error::Result<()> {
    let mut engine = open_engine(cli)?;
    if !engine.snapshot_exists(snapshot)? {
        return Err(error::SnapcasError::SnapshotMissing(snapshot));
    }
    engine.prune(snapshot)?;
    Ok(())
}

fn cmd_check(cli: &Cli) -> error::Result<()> {
    let engine = open_engine(cli)?;
    let corrupt = engine.verify()?;

    if corrupt.is_empty() {
        println!("all blobs verified");
        return Ok(());
    }

    println!("{:>10}  {:30}  {}", "SNAPSHOT", "FILE_NAME", "RELATIVE_PATH");
    for entry in &corrupt {
        println!(
            "{:>10}  {:30}  {}",
            entry.snapshot_id, entry.file_name, entry.relative_path
        );
    }

    Ok(())
}
