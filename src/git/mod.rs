//! Git integration layer.
//!
//! This module wraps the actual backend implementation (`git2_backend`)
//! and re-exports only the stable public API. The rest of the crate talks
//! about repositories, pending changes, and file versions; the libgit2
//! details stay behind this boundary so a future backend could be swapped
//! in without touching the backup or reporting code.

mod git2_backend;

pub use git2_backend::{
    FileVersion, backup_in_sync, commit_all, file_history, open_repo, pending_changes,
    push_branch, read_file_at_rev,
};
