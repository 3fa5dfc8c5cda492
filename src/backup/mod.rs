mod lock;

use anyhow::{Context, Result};
use git2::{Oid, Repository};
use indicatif::ProgressBar;
use std::path::Path;
use std::time::Duration;

use crate::config::{Config, load_config};
use crate::db::{Database, changes};
use crate::git;
use crate::paths::paths;
use crate::progress::{ok_style, spinner_style};

use lock::RunLock;

/// What a single backup run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Another run still holds the lock; nothing was touched.
    Skipped,
    /// Worktree clean and the backup branch already matches the last push.
    UpToDate,
    /// The backup branch was pushed. `freshly_committed` is false when the
    /// run only retried the push of a commit created earlier.
    Pushed {
        commit: Oid,
        freshly_committed: bool,
    },
}

/// Failures the schedule contract tells apart.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The local data store is unreadable or corrupt. Fatal for this run;
    /// nothing was committed.
    #[error("data store snapshot rejected: {reason}")]
    Snapshot { reason: String },

    /// The remote rejected the push or could not be reached. The local
    /// commit survives and the next scheduled run retries it.
    #[error("push to {remote}/{branch} failed: {source}")]
    Push {
        remote: String,
        branch: String,
        #[source]
        source: git2::Error,
    },
}

/// CLI command: run one backup pass over the ambient working copy.
///
/// A skipped overlapping run and a clean up-to-date repository both exit 0;
/// the scheduler only needs to hear about runs that lost data coverage.
pub fn cmd_backup() -> Result<()> {
    let p = paths()?;
    let cfg = load_config(&p.config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("backing up to {}/{}", cfg.remote, cfg.branch));

    match run_backup(&p.repo, &cfg) {
        Ok(BackupOutcome::Skipped) => {
            pb.finish_and_clear();
            eprintln!("another backup is still running; skipping this one");
            Ok(())
        }
        Ok(BackupOutcome::UpToDate) => {
            pb.set_style(ok_style());
            pb.finish_with_message("nothing to back up");
            Ok(())
        }
        Ok(BackupOutcome::Pushed {
            commit,
            freshly_committed,
        }) => {
            pb.set_style(ok_style());
            let sha = commit.to_string();
            let verb = if freshly_committed {
                "backed up"
            } else {
                "pushed earlier backup"
            };
            pb.finish_with_message(format!(
                "{verb} {} to {}/{}",
                &sha[..7],
                cfg.remote,
                cfg.branch
            ));
            Ok(())
        }
        Err(e) => {
            pb.finish_and_clear();
            Err(e)
        }
    }
}

/// One idempotent backup pass: validate the snapshot, commit pending edits,
/// and push the branch to the backup remote.
///
/// Ordering matters. The snapshot is validated before anything is staged so
/// a corrupt data store never enters history ([`BackupError::Snapshot`]).
/// The push happens after the commit so a network failure leaves a valid
/// local commit behind for the next run to retry ([`BackupError::Push`]).
pub fn run_backup(repo_root: &Path, cfg: &Config) -> Result<BackupOutcome> {
    let repo = git::open_repo(repo_root)?;

    let lock_path = repo.path().join("beamdb-backup.lock");
    let Some(_lock) = RunLock::acquire(&lock_path)? else {
        return Ok(BackupOutcome::Skipped);
    };

    let data_path = repo_root.join(&cfg.data_file);
    let db = Database::load(&data_path).map_err(|e| BackupError::Snapshot {
        reason: format!("{e:#}"),
    })?;

    let dirty = git::pending_changes(&repo)?;
    if !dirty && git::backup_in_sync(&repo, &cfg.remote, &cfg.branch)? {
        return Ok(BackupOutcome::UpToDate);
    }

    let (commit, freshly_committed) = if dirty {
        let message = commit_message(&repo, cfg, &db);
        let id = git::commit_all(&repo, &message, cfg.author.as_ref())
            .context("failed to commit pending changes")?;
        (id, true)
    } else {
        let tip = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .context("nothing committed yet and nothing to push")?;
        (tip, false)
    };

    git::push_branch(&repo, &cfg.remote, &cfg.branch).map_err(|source| BackupError::Push {
        remote: cfg.remote.clone(),
        branch: cfg.branch.clone(),
        source,
    })?;

    Ok(BackupOutcome::Pushed {
        commit,
        freshly_committed,
    })
}

/// Commit message for a backup commit: a fixed summary line plus the
/// device-level diff of the data store against HEAD's copy. Deterministic
/// for a given pair of snapshots.
fn commit_message(repo: &Repository, cfg: &Config, current: &Database) -> String {
    let previous = git::read_file_at_rev(repo, "HEAD", &cfg.data_file)
        .ok()
        .and_then(|bytes| Database::from_slice(&bytes).ok())
        .unwrap_or_default();

    let device_changes = changes::device_changes(&previous, current);

    let mut message = String::from("scheduled backup\n");
    if device_changes.is_empty() {
        message.push_str(&format!("\n{}: no device changes\n", cfg.data_file));
        return message;
    }

    let count = |kind| {
        device_changes
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    };
    message.push_str(&format!(
        "\n{}: {} added, {} changed, {} deleted\n",
        cfg.data_file,
        count(changes::ChangeKind::Added),
        count(changes::ChangeKind::Changed),
        count(changes::ChangeKind::Deleted),
    ));
    for change in &device_changes {
        message.push_str(&format!("  {} {}\n", change.kind.as_str(), change.name));
    }
    message
}
