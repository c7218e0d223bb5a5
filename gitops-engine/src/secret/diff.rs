// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::fmt::{Display, Formatter, Result as FmtResult, Write};

use gitops_common::utils::redact;

use crate::secret::Secret;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffType {
    Unchanged,
    Added,
    Removed,
    Changed,
}

impl Display for DiffType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DiffType::Unchanged => write!(f, "unchanged"),
            DiffType::Added => write!(f, "added"),
            DiffType::Removed => write!(f, "removed"),
            DiffType::Changed => write!(f, "changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDiffEntry {
    pub diff_type: DiffType,
    pub key: String,
    pub old_value: String,
    pub new_value: String,
    pub sensitive: bool,
}

impl SecretDiffEntry {
    fn added(key: String, value: &str) -> Self {
        Self { diff_type: DiffType::Added, key, old_value: String::new(), new_value: value.to_string(), sensitive: true }
    }

    fn removed(key: String, value: &str) -> Self {
        Self { diff_type: DiffType::Removed, key, old_value: value.to_string(), new_value: String::new(), sensitive: true }
    }

    fn changed(key: String, old: &str, new: &str, sensitive: bool) -> Self {
        Self { diff_type: DiffType::Changed, key, old_value: old.to_string(), new_value: new.to_string(), sensitive }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDiff {
    pub equal: bool,
    pub diff_type: DiffType,
    pub name: String,
    pub namespace: String,
    pub entries: Vec<SecretDiffEntry>,
}

fn data_key(key: &str) -> String {
    format!("data.{}", key)
}

/// Compare the remote (old) side of a secret against its local (new) side
pub fn compare(remote: Option<&Secret>, local: Option<&Secret>) -> SecretDiff {
    let (remote, local) = match (remote, local) {
        (None, None) => {
            return SecretDiff {
                equal: true,
                diff_type: DiffType::Unchanged,
                name: String::new(),
                namespace: String::new(),
                entries: Vec::new(),
            }
        }
        (None, Some(local)) => {
            return SecretDiff {
                equal: false,
                diff_type: DiffType::Added,
                name: local.name.clone(),
                namespace: local.namespace.clone(),
                entries: local.data
                    .iter()
                    .map(|(key, value)| SecretDiffEntry::added(data_key(key), value))
                    .collect(),
            }
        }
        (Some(remote), None) => {
            return SecretDiff {
                equal: false,
                diff_type: DiffType::Removed,
                name: remote.name.clone(),
                namespace: remote.namespace.clone(),
                entries: remote.data
                    .iter()
                    .map(|(key, value)| SecretDiffEntry::removed(data_key(key), value))
                    .collect(),
            }
        }
        (Some(remote), Some(local)) => (remote, local),
    };

    let mut entries = Vec::new();

    for (field, old, new) in [
        ("target", remote.target.as_str(), local.target.as_str()),
        ("name", remote.name.as_str(), local.name.as_str()),
        ("namespace", remote.namespace.as_str(), local.namespace.as_str()),
        ("type", remote.type_name(), local.type_name()),
    ] {
        if old != new {
            entries.push(SecretDiffEntry::changed(field.to_string(), old, new, false));
        }
    }

    for (key, old) in &remote.data {
        match local.data.get(key) {
            None => entries.push(SecretDiffEntry::removed(data_key(key), old)),
            Some(new) if new != old => entries.push(SecretDiffEntry::changed(data_key(key), old, new, true)),
            Some(_) => {}
        }
    }

    for (key, new) in &local.data {
        if !remote.data.contains_key(key) {
            entries.push(SecretDiffEntry::added(data_key(key), new));
        }
    }

    let equal = entries.is_empty();

    SecretDiff {
        equal,
        diff_type: if equal { DiffType::Unchanged } else { DiffType::Changed },
        name: remote.name.clone(),
        namespace: remote.namespace.clone(),
        entries,
    }
}

impl SecretDiff {
    pub fn entry(&self, key: &str) -> Option<&SecretDiffEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn combined_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    /// Human readable summary, redacting sensitive values unless `cleartext` is set
    pub fn render(&self, cleartext: bool) -> String {
        let mut out = String::new();

        let verb = match self.diff_type {
            DiffType::Unchanged => "unchanged",
            DiffType::Added => "add",
            DiffType::Removed => "remove",
            DiffType::Changed => "change",
        };
        let _ = writeln!(out, "{}: {}", self.combined_name(), verb);

        for entry in &self.entries {
            let (old, new) = if entry.sensitive && !cleartext {
                (redact(&entry.old_value), redact(&entry.new_value))
            } else {
                (entry.old_value.clone(), entry.new_value.clone())
            };
            let _ = match entry.diff_type {
                DiffType::Added => writeln!(out, "  + {}: {}", entry.key, new),
                DiffType::Removed => writeln!(out, "  - {}: {}", entry.key, old),
                DiffType::Changed => writeln!(out, "  ~ {}: {} => {}", entry.key, old, new),
                DiffType::Unchanged => Ok(()),
            };
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{ObjectKind, TargetType};
    use std::collections::BTreeMap;

    fn secret(data: &[(&str, &str)]) -> Secret {
        Secret {
            name: "myName".to_string(),
            namespace: "myNamespace".to_string(),
            target: "clusterA".to_string(),
            target_type: TargetType::Kubernetes,
            kind: ObjectKind::default(),
            data: data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    fn entry_types(diff: &SecretDiff) -> BTreeMap<String, DiffType> {
        diff.entries.iter().map(|e| (e.key.clone(), e.diff_type)).collect()
    }

    #[test]
    fn test_both_missing_is_unchanged() {
        let diff = compare(None, None);
        assert!(diff.equal);
        assert_eq!(diff.diff_type, DiffType::Unchanged);
        assert!(diff.entries.is_empty());
    }

    #[test]
    fn test_identical_secrets_are_equal() {
        let a = secret(&[("user", "u"), ("pass", "p")]);
        let b = a.clone();

        let diff = compare(Some(&a), Some(&b));
        assert!(diff.equal);
        assert_eq!(diff.diff_type, DiffType::Unchanged);
        assert!(diff.entries.is_empty());

        assert!(compare(Some(&a), Some(&a)).equal);
    }

    #[test]
    fn test_added() {
        let local = secret(&[("a", "1"), ("b", "2")]);
        let diff = compare(None, Some(&local));

        assert!(!diff.equal);
        assert_eq!(diff.diff_type, DiffType::Added);
        assert_eq!(diff.entries.len(), 2);
        assert!(diff.entries.iter().all(|e| e.diff_type == DiffType::Added && e.sensitive));
        assert!(diff.entry("data.a").is_some());
        assert!(diff.entry("data.b").is_some());
        assert_eq!(diff.name, "myName");
    }

    #[test]
    fn test_removed() {
        let remote = secret(&[("a", "1"), ("b", "2")]);
        let diff = compare(Some(&remote), None);

        assert_eq!(diff.diff_type, DiffType::Removed);
        assert_eq!(diff.entries.len(), 2);
        assert!(diff.entries.iter().all(|e| e.diff_type == DiffType::Removed));
        assert_eq!(diff.entry("data.a").unwrap().old_value, "1");
    }

    #[test]
    fn test_single_value_change() {
        let remote = secret(&[("a", "1"), ("b", "2")]);
        let local = secret(&[("a", "1"), ("b", "3")]);
        let diff = compare(Some(&remote), Some(&local));

        assert_eq!(diff.diff_type, DiffType::Changed);
        assert_eq!(diff.entries.len(), 1);
        let entry = diff.entry("data.b").unwrap();
        assert_eq!(entry.diff_type, DiffType::Changed);
        assert_eq!(entry.old_value, "2");
        assert_eq!(entry.new_value, "3");
    }

    #[test]
    fn test_set_difference() {
        let remote = secret(&[("key1", "v1"), ("key2", "v2")]);
        let local = secret(&[("key1", "v1'"), ("key3", "v3")]);
        let diff = compare(Some(&remote), Some(&local));

        assert_eq!(diff.entries.len(), 3);
        let types = entry_types(&diff);
        assert_eq!(types["data.key1"], DiffType::Changed);
        assert_eq!(types["data.key2"], DiffType::Removed);
        assert_eq!(types["data.key3"], DiffType::Added);
    }

    #[test]
    fn test_scalar_fields() {
        let remote = secret(&[]);

        let mut local = remote.clone();
        local.target = "clusterB".to_string();
        let diff = compare(Some(&remote), Some(&local));
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(diff.entries[0].key, "target");
        assert!(!diff.entries[0].sensitive);

        let mut local = remote.clone();
        local.kind = ObjectKind::Secret { sub_type: ".dockerconfigjson".to_string() };
        let diff = compare(Some(&remote), Some(&local));
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(diff.entries[0].key, "type");
        assert_eq!(diff.entries[0].diff_type, DiffType::Changed);

        let mut local = remote.clone();
        local.name = "myNameExtended".to_string();
        local.namespace = "other".to_string();
        let diff = compare(Some(&remote), Some(&local));
        assert_eq!(diff.entries.len(), 2);
        assert_eq!(diff.name, "myName");
        assert_eq!(diff.namespace, "myNamespace");
    }

    #[test]
    fn test_render_redacts_sensitive_values() {
        let remote = secret(&[("a", "old")]);
        let local = secret(&[("a", "newer")]);
        let diff = compare(Some(&remote), Some(&local));

        let redacted = diff.render(false);
        assert!(redacted.starts_with("myNamespace/myName: change"));
        assert!(redacted.contains("~ data.a: *** => *****"));

        let cleartext = diff.render(true);
        assert!(cleartext.contains("~ data.a: old => newer"));
    }
}
