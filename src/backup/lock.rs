use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Exclusive run guard for the backup job.
///
/// Scheduled invocations can overlap when a push hangs; the lock makes the
/// later run skip instead of racing the earlier one for the index and HEAD.
/// The file holds the owner's pid so a lock abandoned by a dead process can
/// be reclaimed.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock. `Ok(None)` means another live run holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>> {
        match Self::try_create(path)? {
            Some(lock) => Ok(Some(lock)),
            None if holder_is_dead(path) => {
                let _ = fs::remove_file(path);
                Self::try_create(path)
            }
            None => Ok(None),
        }
    }

    fn try_create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("cannot create lock {}", path.display()))
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether the pid recorded in the lock file no longer exists.
///
/// Only Linux exposes a cheap liveness probe (`/proc/<pid>`); elsewhere the
/// holder is assumed alive and the overlapping run is skipped.
#[cfg(target_os = "linux")]
fn holder_is_dead(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    match contents.trim().parse::<u32>() {
        Ok(pid) => !Path::new("/proc").join(pid.to_string()).exists(),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn holder_is_dead(_path: &Path) -> bool {
    false
}
