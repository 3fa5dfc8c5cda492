//! # beamdb
//!
//! **beamdb** is the maintenance tool for a version-controlled beamline
//! device database: one JSON document tracked in git, edited by operators,
//! and mirrored to a remote backup branch on a schedule.
//!
//! Commands:
//! - `beamdb backup` commits pending edits and pushes them to the backup branch
//! - `beamdb check` validates the data store
//! - `beamdb diff` reports device changes between two revisions
//! - `beamdb log` walks the per-device edit history of the backup branch
//! - `beamdb home` prints the repository root the tool operates on
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use beamdb::{LogOptions, cmd_backup, cmd_check, cmd_diff, cmd_log, repo_root};
use clap::{Parser, Subcommand};

/// Command-line interface definition.
///
/// Parsed using `clap` derive macros.
#[derive(Parser, Debug)]
#[command(
    name = "beamdb",
    version,
    about = "beamdb - beamline device database maintenance tool",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Commit pending edits and push them to the backup branch
    Backup,
    /// Validate that the data store parses as a device database
    Check,
    /// Show device-level changes between two revisions
    Diff {
        /// Older revision
        from: String,
        /// Newer revision
        to: String,
    },
    /// Show the edit history of the data store on the backup branch
    Log(LogOptions),
    /// Print the repository root beamdb operates on
    Home,
}

/// CLI entry point.
///
/// Parses arguments with `clap` and executes the selected subcommand. Any
/// error propagates into a non-zero process exit, which is what the
/// schedule trigger keys off.
fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Backup => cmd_backup(),
        Cmd::Check => cmd_check(),
        Cmd::Diff { from, to } => cmd_diff(&from, &to),
        Cmd::Log(opts) => cmd_log(opts),
        Cmd::Home => {
            println!("{}", repo_root()?.display());
            Ok(())
        }
    }
}
