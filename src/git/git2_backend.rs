use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use git2::{
    Cred, IndexAddOption, Oid, PushOptions, RemoteCallbacks, Repository, Signature, Sort,
    StatusOptions,
};
use std::path::Path;

use crate::config::Author;

/// Build `RemoteCallbacks` with SSH-agent credentials enabled.
///
/// This allows pushes to authenticate using the invoking account's SSH
/// agent. If no agent key is available, it falls back to default
/// credentials (credential helpers, anonymous transports).
fn callbacks_with_creds() -> RemoteCallbacks<'static> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(|_url, username_from_url, _allowed| {
        Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")).or_else(|_| Cred::default())
    });
    cb
}

/// Open the working copy at `path`.
///
/// # Errors
/// Returns an error if `path` is not (inside) a git repository.
pub fn open_repo(path: &Path) -> Result<Repository> {
    Repository::open(path)
        .with_context(|| format!("{} is not a git repository", path.display()))
}

/// Whether any tracked file differs from HEAD, or any non-ignored untracked
/// file exists.
///
/// Untracked files count: in a data store, a new file is an edit that must
/// not be lost.
pub fn pending_changes(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .context("failed to read repository status")?;
    Ok(!statuses.is_empty())
}

/// Stage every pending change (additions, modifications, deletions) and
/// create one commit on HEAD.
///
/// The author/committer identity comes from the repository configuration,
/// falling back to `fallback` when the repository has none. Works on an
/// unborn HEAD: the first commit simply has no parent.
///
/// # Errors
/// Returns an error if staging or committing fails, or if no commit
/// identity can be resolved.
pub fn commit_all(repo: &Repository, message: &str, fallback: Option<&Author>) -> Result<Oid> {
    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"], None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let sig = signature(repo, fallback)?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(_) => None,
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let id = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .context("failed to create commit")?;
    Ok(id)
}

fn signature(repo: &Repository, fallback: Option<&Author>) -> Result<Signature<'static>> {
    if let Ok(sig) = repo.signature() {
        return Ok(sig);
    }
    let author = fallback.ok_or_else(|| {
        anyhow!("no commit identity: set user.name/user.email or [author] in beamdb.toml")
    })?;
    Ok(Signature::now(&author.name, &author.email)?)
}

/// Push the current branch to `refs/heads/<branch>` on the remote.
///
/// The push is never forced, so the remote branch history only ever grows;
/// a remote whose history has moved on rejects the push as a
/// non-fast-forward. Per-ref rejection messages from the server are
/// surfaced as errors. On success the local tracking ref
/// `refs/remotes/<remote>/<branch>` is advanced to the pushed commit, which
/// is what [`backup_in_sync`] keys off.
pub fn push_branch(
    repo: &Repository,
    remote_name: &str,
    branch: &str,
) -> Result<(), git2::Error> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(git2::Error::from_str(
            "HEAD is not on a branch; refusing to push",
        ));
    }
    let local = head
        .shorthand()
        .ok_or_else(|| git2::Error::from_str("current branch has no valid name"))?
        .to_string();
    let tip = head
        .target()
        .ok_or_else(|| git2::Error::from_str("current branch has no commit"))?;

    let mut cb = callbacks_with_creds();
    cb.push_update_reference(|refname, status| match status {
        Some(msg) => Err(git2::Error::from_str(&format!(
            "{refname} rejected by remote: {msg}"
        ))),
        None => Ok(()),
    });
    let mut opts = PushOptions::new();
    opts.remote_callbacks(cb);

    let mut remote = repo.find_remote(remote_name)?;
    let refspec = format!("refs/heads/{local}:refs/heads/{branch}");
    remote.push(&[refspec.as_str()], Some(&mut opts))?;

    repo.reference(
        &format!("refs/remotes/{remote_name}/{branch}"),
        tip,
        true,
        "beamdb: backup pushed",
    )?;
    Ok(())
}

/// Whether the backup branch on the remote already holds the current branch
/// tip, as far as the last push recorded.
///
/// An absent or stale tracking ref means a push is owed; this is how a run
/// that committed but failed to push gets retried by the next run without
/// creating a second commit. An unborn HEAD has nothing to push and counts
/// as in sync.
pub fn backup_in_sync(repo: &Repository, remote_name: &str, branch: &str) -> Result<bool> {
    let Ok(head) = repo.head() else {
        return Ok(true);
    };
    let Some(tip) = head.target() else {
        return Ok(true);
    };
    match repo.find_reference(&format!("refs/remotes/{remote_name}/{branch}")) {
        Ok(tracking) => Ok(tracking.target() == Some(tip)),
        Err(_) => Ok(false),
    }
}

/// Blob contents of `path` at `rev` (any standard revision syntax).
///
/// # Errors
/// Returns an error if the revision cannot be resolved, does not point at a
/// commit, or does not contain `path` as a regular file.
pub fn read_file_at_rev(repo: &Repository, rev: &str, path: &str) -> Result<Vec<u8>> {
    let object = repo
        .revparse_single(rev)
        .with_context(|| format!("unknown revision {rev:?}"))?;
    let commit = object
        .peel_to_commit()
        .with_context(|| format!("revision {rev:?} does not point at a commit"))?;
    let tree = commit.tree()?;
    let entry = tree
        .get_path(Path::new(path))
        .with_context(|| format!("{path} not present at {rev}"))?;
    let object = entry.to_object(repo)?;
    let blob = object
        .as_blob()
        .ok_or_else(|| anyhow!("{path} at {rev} is not a regular file"))?;
    Ok(blob.content().to_vec())
}

/// One version of a tracked file along a revision's history.
#[derive(Debug, Clone)]
pub struct FileVersion {
    pub id: Oid,
    pub when: DateTime<FixedOffset>,
    pub summary: String,
    pub bytes: Vec<u8>,
}

/// Collect the versions of `path` along the first-parent history of `rev`,
/// oldest first.
///
/// A commit contributes a version when it changed the file relative to its
/// first parent. Commits that delete the file are skipped (there is no
/// content to report). `max` bounds the result to the newest versions,
/// still returned oldest first.
pub fn file_history(
    repo: &Repository,
    rev: &str,
    path: &str,
    max: Option<usize>,
) -> Result<Vec<FileVersion>> {
    let target = repo
        .revparse_single(rev)
        .with_context(|| format!("unknown revision {rev:?}"))?
        .peel_to_commit()
        .with_context(|| format!("revision {rev:?} does not point at a commit"))?;

    let mut walk = repo.revwalk()?;
    walk.push(target.id())?;
    walk.set_sorting(Sort::TOPOLOGICAL)?;
    walk.simplify_first_parent()?;

    let file = Path::new(path);
    let mut versions = Vec::new();
    for oid in walk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let entry_id = commit.tree()?.get_path(file).ok().map(|e| e.id());
        let parent_entry_id = match commit.parent(0) {
            Ok(parent) => parent.tree()?.get_path(file).ok().map(|e| e.id()),
            Err(_) => None,
        };

        let Some(entry_id) = entry_id else {
            continue;
        };
        if Some(entry_id) == parent_entry_id {
            continue;
        }

        let blob = repo.find_blob(entry_id)?;
        versions.push(FileVersion {
            id: oid,
            when: commit_time(&commit)?,
            summary: commit.summary().unwrap_or_default().to_string(),
            bytes: blob.content().to_vec(),
        });

        if let Some(limit) = max
            && versions.len() == limit
        {
            break;
        }
    }

    // The walk ran newest-first.
    versions.reverse();
    Ok(versions)
}

fn commit_time(commit: &git2::Commit) -> Result<DateTime<FixedOffset>> {
    let time = commit.time();
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)
        .or_else(|| FixedOffset::east_opt(0))
        .ok_or_else(|| anyhow!("invalid commit timezone"))?;
    let utc = Utc
        .timestamp_opt(time.seconds(), 0)
        .single()
        .ok_or_else(|| anyhow!("invalid commit timestamp"))?;
    Ok(utc.with_timezone(&offset))
}
