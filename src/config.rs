use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Tool configuration, stored inside the managed repository as
/// `beamdb.toml`.
///
/// Every field has a default so the scheduled backup entry point can run
/// with no arguments and no configuration file at all.
///
/// Example TOML:
/// ```toml
/// data_file = "db.json"
/// remote    = "origin"
/// branch    = "deploy"
/// skip_keys = ["last_edit"]
///
/// [author]
/// name  = "beamline backup"
/// email = "backup@localhost"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Relative path of the JSON data store inside the repository.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Git remote that receives backups.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Remote branch that receives backups.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Fallback commit identity, used when the repository has no
    /// `user.name`/`user.email` of its own.
    #[serde(default)]
    pub author: Option<Author>,

    /// Record keys left out of history reports. The database tooling
    /// rewrites `last_edit` on every save, so reporting it is noise.
    #[serde(default = "default_skip_keys")]
    pub skip_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

fn default_data_file() -> String {
    "db.json".into()
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "deploy".into()
}

fn default_skip_keys() -> Vec<String> {
    vec!["last_edit".into()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            remote: default_remote(),
            branch: default_branch(),
            author: None,
            skip_keys: default_skip_keys(),
        }
    }
}

/// Load `beamdb.toml` from the given path.
///
/// # Errors
/// - Returns an error if the file exists but cannot be read or parsed.
///
/// # Notes
/// - A missing file is not an error; the defaults apply.
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let cfg: Config =
        toml::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_config(&td.path().join("beamdb.toml")).unwrap();
        assert_eq!(cfg.data_file, "db.json");
        assert_eq!(cfg.remote, "origin");
        assert_eq!(cfg.branch, "deploy");
        assert!(cfg.author.is_none());
        assert_eq!(cfg.skip_keys, vec!["last_edit".to_string()]);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("beamdb.toml");
        fs::write(&path, "branch = \"backup\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.branch, "backup");
        assert_eq!(cfg.data_file, "db.json");
    }

    #[test]
    fn full_file_parses() {
        let td = tempdir().unwrap();
        let path = td.path().join("beamdb.toml");
        fs::write(
            &path,
            concat!(
                "data_file = \"devices.json\"\n",
                "remote = \"backup\"\n",
                "branch = \"mirror\"\n",
                "skip_keys = [\"last_edit\", \"documentation\"]\n",
                "[author]\n",
                "name = \"cron\"\n",
                "email = \"cron@localhost\"\n",
            ),
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.data_file, "devices.json");
        assert_eq!(cfg.remote, "backup");
        assert_eq!(cfg.branch, "mirror");
        assert_eq!(cfg.skip_keys.len(), 2);
        let author = cfg.author.unwrap();
        assert_eq!(author.name, "cron");
        assert_eq!(author.email, "cron@localhost");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let td = tempdir().unwrap();
        let path = td.path().join("beamdb.toml");
        fs::write(&path, "branch = [not toml").unwrap();
        assert!(load_config(&path).is_err());
    }
}
