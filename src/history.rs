use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::config::load_config;
use crate::db::changes::{self, ChangeKind, KeyChange};
use crate::db::{Database, Device};
use crate::git::{self, FileVersion};
use crate::paths::paths;

/// Options for `beamdb log`.
#[derive(Args, Debug, Clone)]
pub struct LogOptions {
    /// Revision whose history to walk (defaults to the backup branch)
    #[arg(long, value_name = "rev")]
    pub rev: Option<String>,

    /// Only report changes to this device
    #[arg(long, value_name = "name")]
    pub item: Option<String>,

    /// Walk at most the newest N versions of the data store
    #[arg(long, value_name = "N")]
    pub max_commits: Option<usize>,

    /// Record keys to leave out of the report (repeatable, adds to the
    /// configured skip_keys)
    #[arg(long = "skip-key", value_name = "key")]
    pub skip_keys: Vec<String>,
}

/// CLI command: walk the data store's history and print what changed,
/// device by device.
///
/// One block is printed per commit that touched the data store, oldest
/// first: renames, devices added or deleted, and per-key `old -> new` lines
/// for surviving devices. With `--item`, only that device's history is
/// shown. A historical version that no longer parses is reported and
/// skipped rather than ending the walk.
///
/// # Errors
/// Returns an error if the revision cannot be resolved or the repository
/// cannot be read.
pub fn cmd_log(opts: LogOptions) -> Result<()> {
    let p = paths()?;
    let cfg = load_config(&p.config)?;
    let repo = git::open_repo(&p.repo)?;

    let rev = opts.rev.as_deref().unwrap_or(&cfg.branch);
    let mut skip_keys = cfg.skip_keys.clone();
    skip_keys.extend(opts.skip_keys.iter().cloned());

    let versions = git::file_history(&repo, rev, &cfg.data_file, opts.max_commits)?;
    if versions.is_empty() {
        println!("no history for {} at {}", cfg.data_file, rev);
        return Ok(());
    }

    match &opts.item {
        Some(item) => print_item_changes(&versions, item, &skip_keys),
        None => print_all_changes(&versions, &skip_keys),
    }
    Ok(())
}

fn parse_version(version: &FileVersion) -> Option<Database> {
    match Database::from_slice(&version.bytes) {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!(
                "skipping unparseable data store at {}: {e:#}",
                &version.id.to_string()[..7]
            );
            None
        }
    }
}

fn print_all_changes(versions: &[FileVersion], skip_keys: &[String]) {
    let mut last = Database::default();
    for version in versions {
        let Some(db) = parse_version(version) else {
            continue;
        };

        let mut printed_header = false;
        let mut header = || {
            if !printed_header {
                println!();
                println!(
                    "## {}: {}",
                    version.when.format("%Y-%m-%d %H:%M:%S %z"),
                    version.summary
                );
                printed_header = true;
            }
        };

        // Carry renamed records forward under their new name so only
        // genuine field edits show up below.
        let mut carried = last.clone();
        for (old_name, new_name) in changes::find_renames(&last, &db, skip_keys) {
            header();
            println!("* {}: {} -> {}", "renamed".cyan(), old_name, new_name);
            if let Some(record) = carried.remove(&old_name) {
                carried.insert(new_name, record);
            }
        }

        for change in changes::device_changes(&carried, &db) {
            match change.kind {
                ChangeKind::Added => {
                    header();
                    println!("* {}: {}", "added".green(), change.name);
                }
                ChangeKind::Deleted => {
                    header();
                    println!("* {}: {}", "deleted".red(), change.name);
                }
                ChangeKind::Changed => {
                    let empty = Device::new();
                    let before = carried.get(&change.name).unwrap_or(&empty);
                    let after = db.get(&change.name).unwrap_or(&empty);
                    for kc in changes::key_changes(before, after, skip_keys) {
                        header();
                        println!("* {} {}: {}", change.name, kc.key, describe(&kc));
                    }
                }
            }
        }

        last = db;
    }
}

fn print_item_changes(versions: &[FileVersion], item: &str, skip_keys: &[String]) {
    let mut last = Device::new();
    for version in versions {
        let Some(db) = parse_version(version) else {
            continue;
        };
        let Some(current) = db.get(item) else {
            continue;
        };

        let key_changes = changes::key_changes(&last, current, skip_keys);
        if key_changes.is_empty() {
            continue;
        }

        println!();
        println!(
            "{}  {}",
            version.when.format("%Y-%m-%d %H:%M:%S %z"),
            version.summary
        );
        for kc in &key_changes {
            println!("  {}: {}", kc.key, describe(kc));
        }
        last = current.clone();
    }
}

fn describe(kc: &KeyChange) -> String {
    match (&kc.old, &kc.new) {
        (None, Some(new)) => changes::display_value(new),
        (Some(_), None) => "(deleted key)".to_string(),
        (Some(old), Some(new)) => format!(
            "{} -> {}",
            changes::display_value(old),
            changes::display_value(new)
        ),
        (None, None) => String::new(),
    }
}
