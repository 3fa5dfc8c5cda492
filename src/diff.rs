use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::config::load_config;
use crate::db::changes::{self, ChangeKind, KeyChange};
use crate::db::{Database, Device};
use crate::git;
use crate::paths::paths;

/// CLI command: report device-level changes in the data store between two
/// revisions.
///
/// For every device that differs, the per-key changes are listed, followed
/// by a one-line-per-device summary and the overall tally. Output order is
/// sorted by device name, so the report for a given pair of revisions is
/// always the same.
///
/// Example output:
/// ```text
/// * xpp_gon_01 was changed
///   changed key z: 716.5
///
/// * Summary:
///   xpp_gon_01 was changed
///
/// Device changes 1 of total devices 143
/// ```
///
/// # Errors
/// Returns an error if either revision cannot be resolved or the data store
/// at either revision does not parse.
pub fn cmd_diff(from: &str, to: &str) -> Result<()> {
    let p = paths()?;
    let cfg = load_config(&p.config)?;
    let repo = git::open_repo(&p.repo)?;

    let old = Database::from_slice(&git::read_file_at_rev(&repo, from, &cfg.data_file)?)?;
    let new = Database::from_slice(&git::read_file_at_rev(&repo, to, &cfg.data_file)?)?;

    let device_changes = changes::device_changes(&old, &new);
    let empty = Device::new();
    for change in &device_changes {
        println!();
        println!("* {} was {}", change.name, paint(change.kind));
        let before = old.get(&change.name).unwrap_or(&empty);
        let after = new.get(&change.name).unwrap_or(&empty);
        for kc in changes::key_changes(before, after, &[]) {
            println!("  {}", describe_key_change(&kc));
        }
    }

    println!();
    println!("* Summary:");
    for change in &device_changes {
        println!("  {} was {}", change.name, paint(change.kind));
    }

    println!();
    println!(
        "Device changes {} of total devices {}",
        device_changes.len(),
        new.len()
    );
    Ok(())
}

fn describe_key_change(kc: &KeyChange) -> String {
    match (&kc.kind, &kc.new) {
        (ChangeKind::Deleted, _) => format!("deleted key {}", kc.key),
        (kind, Some(value)) => format!(
            "{} key {}: {}",
            kind.as_str(),
            kc.key,
            changes::display_value(value)
        ),
        (kind, None) => format!("{} key {}", kind.as_str(), kc.key),
    }
}

fn paint(kind: ChangeKind) -> ColoredString {
    match kind {
        ChangeKind::Added => "added".green(),
        ChangeKind::Deleted => "deleted".red(),
        ChangeKind::Changed => "changed".yellow(),
    }
}
