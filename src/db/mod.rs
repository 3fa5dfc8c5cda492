pub mod changes;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::load_config;
use crate::paths::paths;

/// One device record: a flat JSON object whose keys and meaning belong to
/// the external client library. beamdb treats the values as opaque.
pub type Device = Map<String, Value>;

/// The device database: every record in the data store, keyed by device
/// name.
///
/// The raw document is a JSON object whose values are device records. A
/// record is filed under its `"name"` field when it carries one, otherwise
/// under its outer key; hand-maintained stores drift between the two
/// conventions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Database {
    devices: BTreeMap<String, Device>,
}

impl Database {
    /// Parse and validate a raw data store document.
    ///
    /// # Errors
    /// - The bytes are not valid JSON.
    /// - The root is not a JSON object.
    /// - Any entry is not a JSON object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let root: Value =
            serde_json::from_slice(bytes).context("data store is not valid JSON")?;
        let Value::Object(entries) = root else {
            bail!("data store root must be a JSON object");
        };

        let mut devices = BTreeMap::new();
        for (key, value) in entries {
            let Value::Object(record) = value else {
                bail!("entry {key:?} is not a JSON object");
            };
            let name = match record.get("name") {
                Some(Value::String(name)) => name.clone(),
                _ => key,
            };
            devices.insert(name, record);
        }

        Ok(Self { devices })
    }

    /// Read and validate the data store at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("cannot read data store {}", path.display()))?;
        Self::from_slice(&bytes)
            .with_context(|| format!("data store {} is corrupt", path.display()))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    /// Device names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Records in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Device)> {
        self.devices.iter()
    }

    pub fn insert(&mut self, name: String, record: Device) {
        self.devices.insert(name, record);
    }

    pub fn remove(&mut self, name: &str) -> Option<Device> {
        self.devices.remove(name)
    }
}

/// CLI command: validate the working-copy data store.
///
/// This is the file-level guarantee the repository makes to its readers:
/// the data store exists and parses as an object of device records. Record
/// contents are not inspected.
///
/// # Errors
/// Returns an error (and thus a non-zero exit) when the data store is
/// missing, unreadable, or malformed.
pub fn cmd_check() -> Result<()> {
    let p = paths()?;
    let cfg = load_config(&p.config)?;
    let db = Database::load(&p.repo.join(&cfg.data_file))?;
    println!("{}: OK ({} devices)", cfg.data_file, db.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_keyed_by_name_field() {
        let db = Database::from_slice(
            br#"{"_id_1": {"name": "xpp_gon_01", "beamline": "XPP"}}"#,
        )
        .unwrap();
        assert!(db.contains("xpp_gon_01"));
        assert!(!db.contains("_id_1"));
    }

    #[test]
    fn records_without_name_fall_back_to_outer_key() {
        let db = Database::from_slice(br#"{"mfx_det_02": {"beamline": "MFX"}}"#).unwrap();
        assert!(db.contains("mfx_det_02"));
    }

    #[test]
    fn iteration_is_sorted_by_name() {
        let db = Database::from_slice(
            br#"{"b": {"name": "b"}, "a": {"name": "a"}, "c": {"name": "c"}}"#,
        )
        .unwrap();
        let names: Vec<&str> = db.names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_non_json_bytes() {
        assert!(Database::from_slice(b"not json at all").is_err());
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(Database::from_slice(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn rejects_non_object_record() {
        assert!(Database::from_slice(br#"{"dev": "just a string"}"#).is_err());
    }

    #[test]
    fn empty_store_is_valid() {
        let db = Database::from_slice(b"{}").unwrap();
        assert!(db.is_empty());
    }
}
