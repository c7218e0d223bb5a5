// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! Values files supply templating context to the declarations beneath them.
//!
//! A values file applies to its own directory and every directory below it.
//! Nested values are deep-merged over their ancestors' values, and a
//! declaration is rendered with the values of the deepest directory that
//! contains it. Placeholders take the form `{{ .Values.some.key }}`.

use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::LazyLock;

use gitops_common::constant::VALUES_FILE_NAMES;

use crate::error::{EngineError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.Values((?:\.[A-Za-z0-9_-]+)+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Whether a (relative) path names a values file rather than a secret declaration
pub fn is_values_file(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    VALUES_FILE_NAMES.contains(&file_name)
}

/// Directory prefix a values file applies to, `""` for the repository root
fn values_scope(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..=index].to_string(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
struct ValuesScope {
    dir: String,
    merged: Value,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    scopes: Vec<ValuesScope>,
}

impl TemplateValues {
    /// Build the merged value scopes from decrypted values files
    ///
    /// # Arguments
    /// * `files` - Pairs of slash-normalized relative path and decrypted content
    pub fn from_files(files: Vec<(String, Vec<u8>)>) -> Result<Self> {
        let mut parsed = files
            .into_iter()
            .map(|(path, content)| {
                let value: Value = serde_yaml::from_slice(&content)
                    .map_err(|source| EngineError::Parse { path: path.clone(), source })?;
                // Empty or comment-only files contribute nothing
                let value = match value {
                    Value::Null => Value::Mapping(Mapping::new()),
                    value => value,
                };
                Ok((values_scope(&path), value))
            })
            .collect::<Result<Vec<_>>>()?;

        // Ancestors always sort before their descendants
        parsed.sort_by_key(|(dir, _)| dir.matches('/').count());

        let mut scopes: Vec<ValuesScope> = Vec::with_capacity(parsed.len());
        for (dir, values) in parsed {
            let merged = match nearest_scope(&scopes, &dir) {
                Some(parent) => merge_values(&parent.merged, &values),
                None => values,
            };
            scopes.push(ValuesScope { dir, merged });
        }

        Ok(Self { scopes })
    }

    /// Merged values applying to a declaration path, if any values file covers it
    pub fn values_for(&self, path: &str) -> Option<&Value> {
        nearest_scope(&self.scopes, path).map(|scope| &scope.merged)
    }

    /// Render the placeholders in a declaration. Content without placeholders
    /// is returned unchanged.
    pub fn render(&self, path: &str, content: Vec<u8>) -> Result<Vec<u8>> {
        let text = match std::str::from_utf8(&content) {
            Ok(text) if PLACEHOLDER.is_match(text) => text,
            _ => return Ok(content),
        };

        let empty = Value::Mapping(Mapping::new());
        let values = self.values_for(path).unwrap_or(&empty);

        let mut rendered = String::with_capacity(text.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(key_path)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            rendered.push_str(&text[last..whole.start()]);
            rendered.push_str(&lookup_scalar(values, key_path.as_str()).ok_or_else(|| {
                EngineError::Template {
                    path: path.to_string(),
                    message: format!("no scalar value for .Values{}", key_path.as_str()),
                }
            })?);
            last = whole.end();
        }
        rendered.push_str(&text[last..]);

        Ok(rendered.into_bytes())
    }
}

fn nearest_scope<'a>(scopes: &'a [ValuesScope], path: &str) -> Option<&'a ValuesScope> {
    scopes
        .iter()
        .filter(|scope| path.starts_with(&scope.dir) && path != scope.dir)
        .max_by_key(|scope| scope.dir.len())
}

/// Deep merge `overlay` onto `base`: maps merge recursively, a null overlay
/// keeps the base, anything else replaces
fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (_, Value::Null) => base.clone(),
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Mapping(merged)
        }
        _ => overlay.clone(),
    }
}

fn lookup_scalar(values: &Value, key_path: &str) -> Option<String> {
    let mut current = values;
    for part in key_path.split('.').filter(|part| !part.is_empty()) {
        current = current.get(part)?;
    }

    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues {
        TemplateValues::from_files(vec![
            ("apps/prod/values.gitops.secret.enc.yaml".to_string(), b"db:\n  host: prod-db\n".to_vec()),
            ("values.gitops.secret.enc.yml".to_string(), b"db:\n  host: base-db\n  port: 5432\nregion: eu\n".to_vec()),
            ("apps/values.gitops.secret.enc.yml".to_string(), b"region: us\n".to_vec()),
        ]).unwrap()
    }

    #[test]
    fn test_is_values_file() {
        assert!(is_values_file("a/b/values.gitops.secret.enc.yaml"));
        assert!(is_values_file("values.gitops.secret.enc.yml"));
        assert!(!is_values_file("a/my-values.gitops.secret.enc.yaml"));
    }

    #[test]
    fn test_nested_values_are_merged() {
        let values = values();
        let prod = values.values_for("apps/prod/db.gitops.secret.enc.yaml").unwrap();

        assert_eq!(lookup_scalar(prod, ".db.host").as_deref(), Some("prod-db"));
        assert_eq!(lookup_scalar(prod, ".db.port").as_deref(), Some("5432"));
        assert_eq!(lookup_scalar(prod, ".region").as_deref(), Some("us"));

        let root = values.values_for("db.gitops.secret.enc.yaml").unwrap();
        assert_eq!(lookup_scalar(root, ".region").as_deref(), Some("eu"));
    }

    #[test]
    fn test_empty_values_file_inherits_parent_values() {
        let values = TemplateValues::from_files(vec![
            ("values.gitops.secret.enc.yml".to_string(), b"cluster: prod
".to_vec()),
            ("apps/values.gitops.secret.enc.yml".to_string(), b"# nothing to override yet
".to_vec()),
            ("apps/web/values.gitops.secret.enc.yml".to_string(), b"".to_vec()),
        ]).unwrap();

        let rendered = values
            .render("apps/web/db.gitops.secret.enc.yaml", b"target: {{ .Values.cluster }}
".to_vec())
            .unwrap();
        assert_eq!(String::from_utf8(rendered).unwrap(), "target: prod
");
    }

    #[test]
    fn test_null_overlay_keeps_base() {
        let base: Value = serde_yaml::from_str("db:
  host: a
  port: 1
").unwrap();
        let overlay: Value = serde_yaml::from_str("db:
  host: ~
").unwrap();

        let merged = merge_values(&base, &overlay);
        assert_eq!(lookup_scalar(&merged, ".db.host").as_deref(), Some("a"));
        assert_eq!(lookup_scalar(&merged, ".db.port").as_deref(), Some("1"));
    }

    #[test]
    fn test_render_placeholders() {
        let values = values();
        let rendered = values
            .render(
                "apps/prod/db.gitops.secret.enc.yaml",
                b"target: a\ndata:\n  url: postgres://{{ .Values.db.host }}:{{.Values.db.port}}\n".to_vec(),
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "target: a\ndata:\n  url: postgres://prod-db:5432\n"
        );
    }

    #[test]
    fn test_render_without_placeholders_is_verbatim() {
        let content = b"target: a\ndata:\n  x: '{{ not a value }}'\n".to_vec();
        let rendered = TemplateValues::default().render("x.gitops.secret.enc.yml", content.clone()).unwrap();
        assert_eq!(rendered, content);
    }

    #[test]
    fn test_render_missing_value_fails() {
        let result = values().render("apps/x.gitops.secret.enc.yml", b"v: {{ .Values.nope }}".to_vec());
        assert!(matches!(result, Err(EngineError::Template { .. })));
    }
}
