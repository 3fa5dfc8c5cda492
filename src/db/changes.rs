//! Change computation between database revisions.
//!
//! Everything here is pure: two parsed databases (or two device records) in,
//! a sorted list of changes out. The reporting commands and the backup
//! commit message are all built on these primitives.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::{Database, Device};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Changed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Changed => "changed",
        }
    }
}

/// A device that was added, deleted, or edited between two revisions.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChange {
    pub name: String,
    pub kind: ChangeKind,
}

/// One key of a device record that differs between two revisions.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    pub kind: ChangeKind,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Display form of a record value: strings bare, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether two records are the same device configuration.
///
/// Values are compared in stringified form, tolerating the type drift a
/// hand-edited store accumulates over the years (`1` vs `"1"`).
pub fn is_same(a: &Device, b: &Device) -> bool {
    same_except(a, b, &[])
}

fn same_except(a: &Device, b: &Device, ignore: &[&str]) -> bool {
    let keys_a: BTreeSet<&str> = a
        .keys()
        .map(String::as_str)
        .filter(|k| !ignore.contains(k))
        .collect();
    let keys_b: BTreeSet<&str> = b
        .keys()
        .map(String::as_str)
        .filter(|k| !ignore.contains(k))
        .collect();
    if keys_a != keys_b {
        return false;
    }
    keys_a.iter().all(|key| {
        match (a.get(*key), b.get(*key)) {
            (Some(va), Some(vb)) => display_value(va) == display_value(vb),
            _ => false,
        }
    })
}

/// Devices added, deleted, or edited going from `old` to `new`, sorted by
/// device name.
pub fn device_changes(old: &Database, new: &Database) -> Vec<DeviceChange> {
    let mut out = Vec::new();
    for (name, record) in new.iter() {
        match old.get(name) {
            None => out.push(DeviceChange {
                name: name.clone(),
                kind: ChangeKind::Added,
            }),
            Some(prev) if prev != record => out.push(DeviceChange {
                name: name.clone(),
                kind: ChangeKind::Changed,
            }),
            Some(_) => {}
        }
    }
    for name in old.names() {
        if !new.contains(name) {
            out.push(DeviceChange {
                name: name.to_string(),
                kind: ChangeKind::Deleted,
            });
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Per-key changes going from `old` to `new`, sorted by key. Keys listed in
/// `skip_keys` are left out.
pub fn key_changes(old: &Device, new: &Device, skip_keys: &[String]) -> Vec<KeyChange> {
    let skip = |key: &str| skip_keys.iter().any(|s| s == key);

    let mut out = Vec::new();
    for (key, value) in new {
        if skip(key) {
            continue;
        }
        match old.get(key) {
            None => out.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Added,
                old: None,
                new: Some(value.clone()),
            }),
            Some(prev) if prev != value => out.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Changed,
                old: Some(prev.clone()),
                new: Some(value.clone()),
            }),
            Some(_) => {}
        }
    }
    for (key, value) in old {
        if skip(key) {
            continue;
        }
        if !new.contains_key(key) {
            out.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Deleted,
                old: Some(value.clone()),
                new: None,
            });
        }
    }
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

/// Pair deleted names with added names whose record content is otherwise
/// identical, i.e. a device that was renamed between two revisions.
///
/// The `"name"` field and the skip keys are ignored in the comparison: a
/// rename rewrites the former by definition and the latter on every save.
/// Returns `old name -> new name`.
pub fn find_renames(
    old: &Database,
    new: &Database,
    skip_keys: &[String],
) -> BTreeMap<String, String> {
    let deleted: Vec<&str> = old.names().filter(|n| !new.contains(n)).collect();
    let added: Vec<&str> = new.names().filter(|n| !old.contains(n)).collect();

    let mut ignore: Vec<&str> = vec!["name"];
    ignore.extend(skip_keys.iter().map(String::as_str));

    let mut renames = BTreeMap::new();
    let mut claimed: BTreeSet<&str> = BTreeSet::new();
    for gone in deleted {
        let Some(gone_record) = old.get(gone) else {
            continue;
        };
        for &candidate in &added {
            if claimed.contains(candidate) {
                continue;
            }
            let Some(candidate_record) = new.get(candidate) else {
                continue;
            };
            if same_except(gone_record, candidate_record, &ignore) {
                renames.insert(gone.to_string(), candidate.to_string());
                claimed.insert(candidate);
                break;
            }
        }
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db(raw: &str) -> Database {
        Database::from_slice(raw.as_bytes()).unwrap()
    }

    fn record(raw: &str) -> Device {
        match serde_json::from_str(raw).unwrap() {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn device_changes_classifies_all_three_kinds() {
        let old = db(r#"{"a": {"name": "a", "z": "1"}, "b": {"name": "b"}}"#);
        let new = db(r#"{"a": {"name": "a", "z": "2"}, "c": {"name": "c"}}"#);
        let got = device_changes(&old, &new);
        let kinds: Vec<(&str, ChangeKind)> =
            got.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ChangeKind::Changed),
                ("b", ChangeKind::Deleted),
                ("c", ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn identical_databases_have_no_changes() {
        let old = db(r#"{"a": {"name": "a", "z": "1"}}"#);
        assert!(device_changes(&old, &old.clone()).is_empty());
    }

    #[test]
    fn key_changes_reports_old_and_new_values() {
        let old = record(r#"{"z": "715.0", "prefix": "XPP:GON:01"}"#);
        let new = record(r#"{"z": "716.5", "stand": "DG2"}"#);
        let got = key_changes(&old, &new, &[]);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].key, "prefix");
        assert_eq!(got[0].kind, ChangeKind::Deleted);
        assert_eq!(got[1].key, "stand");
        assert_eq!(got[1].kind, ChangeKind::Added);
        assert_eq!(got[2].key, "z");
        assert_eq!(got[2].kind, ChangeKind::Changed);
        assert_eq!(got[2].old, Some(json!("715.0")));
        assert_eq!(got[2].new, Some(json!("716.5")));
    }

    #[test]
    fn key_changes_honors_skip_keys() {
        let old = record(r#"{"z": "1", "last_edit": "2024-01-01"}"#);
        let new = record(r#"{"z": "1", "last_edit": "2024-06-01"}"#);
        let got = key_changes(&old, &new, &["last_edit".to_string()]);
        assert!(got.is_empty());
    }

    #[test]
    fn is_same_tolerates_type_drift() {
        let a = record(r#"{"z": 715}"#);
        let b = record(r#"{"z": "715"}"#);
        assert!(is_same(&a, &b));
    }

    #[test]
    fn is_same_requires_matching_key_sets() {
        let a = record(r#"{"z": "715"}"#);
        let b = record(r#"{"z": "715", "stand": "DG2"}"#);
        assert!(!is_same(&a, &b));
    }

    #[test]
    fn find_renames_pairs_matching_records() {
        let old = db(r#"{"xpp_gon_old": {"name": "xpp_gon_old", "z": "715", "last_edit": "a"}}"#);
        let new = db(r#"{"xpp_gon_new": {"name": "xpp_gon_new", "z": "715", "last_edit": "b"}}"#);
        let renames = find_renames(&old, &new, &["last_edit".to_string()]);
        assert_eq!(
            renames.get("xpp_gon_old").map(String::as_str),
            Some("xpp_gon_new")
        );
    }

    #[test]
    fn find_renames_ignores_genuinely_different_devices() {
        let old = db(r#"{"a": {"name": "a", "z": "1"}}"#);
        let new = db(r#"{"b": {"name": "b", "z": "2"}}"#);
        assert!(find_renames(&old, &new, &[]).is_empty());
    }

    #[test]
    fn find_renames_claims_each_added_name_once() {
        let old = db(
            r#"{"a1": {"name": "a1", "z": "1"}, "a2": {"name": "a2", "z": "1"}}"#,
        );
        let new = db(r#"{"b1": {"name": "b1", "z": "1"}}"#);
        let renames = find_renames(&old, &new, &[]);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames.get("a1").map(String::as_str), Some("b1"));
    }
}
