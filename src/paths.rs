use anyhow::Result;
use std::{env, path::PathBuf};

#[derive(Clone)]
pub struct Paths {
    pub repo: PathBuf,
    pub config: PathBuf,
}

/// The working copy beamdb operates on: `$BEAMDB_REPO` if set, else the
/// current directory. The scheduler is expected to `cd` into the checkout
/// (or export the variable) before invoking the tool.
pub fn repo_root() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("BEAMDB_REPO") {
        return Ok(PathBuf::from(dir));
    }
    Ok(env::current_dir()?)
}

pub fn paths() -> Result<Paths> {
    let repo = repo_root()?;
    Ok(Paths {
        config: repo.join("beamdb.toml"),
        repo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn repo_root_prefers_env_override() {
        unsafe { env::set_var("BEAMDB_REPO", "/data/device_db") };
        let got = repo_root().unwrap();
        unsafe { env::remove_var("BEAMDB_REPO") };
        assert_eq!(got, PathBuf::from("/data/device_db"));
    }

    #[test]
    #[serial]
    fn repo_root_defaults_to_current_dir() {
        unsafe { env::remove_var("BEAMDB_REPO") };
        assert_eq!(repo_root().unwrap(), env::current_dir().unwrap());
    }

    #[test]
    #[serial]
    fn paths_derive_config_location() {
        unsafe { env::set_var("BEAMDB_REPO", "/data/device_db") };
        let p = paths().unwrap();
        unsafe { env::remove_var("BEAMDB_REPO") };
        assert_eq!(p.config, PathBuf::from("/data/device_db/beamdb.toml"));
    }
}
