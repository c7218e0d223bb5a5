// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod decrypt;
pub mod diff;
pub mod loader;
pub mod templating;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::{collections::BTreeMap, fmt::{Display, Formatter, Result as FmtResult}, str::FromStr};

use gitops_common::constant::{
    CONFIG_MAP_TYPE, DEFAULT_NAMESPACE, DEFAULT_SECRET_TYPE, SECRET_FILE_SUFFIXES,
};
use gitops_common::utils::{sha256_hex, strip_any_suffix};

use crate::error::{EngineError, Result};

/// Kind of system a secret is reconciled into. `All` only exists as a
/// query wildcard and is rejected as a declaration value.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetType {
    #[default]
    #[serde(rename = "k8s", alias = "kubernetes")]
    Kubernetes,
    #[serde(rename = "vault")]
    Vault,
    #[serde(rename = "all")]
    All,
}

impl TargetType {
    /// Whether a secret of type `other` passes a filter of this type
    pub fn matches(&self, other: TargetType) -> bool {
        *self == TargetType::All || *self == other
    }
}

impl Display for TargetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TargetType::Kubernetes => write!(f, "k8s"),
            TargetType::Vault => write!(f, "vault"),
            TargetType::All => write!(f, "all"),
        }
    }
}

impl FromStr for TargetType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "k8s" | "kubernetes" => Ok(TargetType::Kubernetes),
            "vault" => Ok(TargetType::Vault),
            "all" => Ok(TargetType::All),
            other => Err(EngineError::UnsupportedTargetType(other.to_string())),
        }
    }
}

/// Remote object kind, resolved once from the declared `type`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ConfigMap,
    Secret { sub_type: String },
}

impl ObjectKind {
    pub fn from_type(type_name: &str) -> Self {
        if type_name == CONFIG_MAP_TYPE {
            ObjectKind::ConfigMap
        } else {
            ObjectKind::Secret { sub_type: type_name.to_string() }
        }
    }

    /// The declared `type` string this kind was resolved from
    pub fn type_name(&self) -> &str {
        match self {
            ObjectKind::ConfigMap => CONFIG_MAP_TYPE,
            ObjectKind::Secret { sub_type } => sub_type,
        }
    }

    pub fn is_config_map(&self) -> bool {
        matches!(self, ObjectKind::ConfigMap)
    }
}

impl Default for ObjectKind {
    fn default() -> Self {
        ObjectKind::Secret { sub_type: DEFAULT_SECRET_TYPE.to_string() }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ObjectKind::ConfigMap => write!(f, "ConfigMap"),
            ObjectKind::Secret { .. } => write!(f, "Secret"),
        }
    }
}

/// A secret as declared locally, or as read back from a cluster
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Secret {
    /// Stable identity, assigned from state. Empty for remote objects.
    pub id: String,
    /// Slash-normalized path relative to the repository root. Empty for remote objects.
    pub path: String,
    /// Name of the destination cluster
    pub target: String,
    pub target_type: TargetType,
    pub name: String,
    pub namespace: String,
    pub kind: ObjectKind,
    pub data: BTreeMap<String, String>,
    /// Hex SHA-256 of the decrypted declaration
    pub binary_data_hash: String,
}

impl Secret {
    /// Build a secret from the decrypted (and rendered) bytes of a declaration file
    pub fn from_declaration(path: &str, content: &[u8]) -> Result<Self> {
        let declaration: SecretDeclaration = serde_yaml::from_slice(content)
            .map_err(|source| EngineError::Parse { path: path.to_string(), source })?;

        let target_type = declaration.target_type.unwrap_or_default();
        if target_type == TargetType::All {
            return Err(EngineError::InvalidDeclaration {
                path: path.to_string(),
                message: "targetType 'all' is only valid as a filter".to_string(),
            });
        }
        if declaration.target.trim().is_empty() {
            return Err(EngineError::InvalidDeclaration {
                path: path.to_string(),
                message: "target must not be empty".to_string(),
            });
        }

        let data = declaration.data
            .into_iter()
            .map(|(key, value)| {
                scalar_to_string(&value)
                    .map(|value| (key.clone(), value))
                    .ok_or_else(|| EngineError::InvalidDeclaration {
                        path: path.to_string(),
                        message: format!("data.{} must be a scalar value", key),
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Secret {
            id: String::new(),
            path: path.to_string(),
            target: declaration.target,
            target_type,
            name: non_empty(declaration.name).unwrap_or_else(|| secret_basename(path)),
            namespace: non_empty(declaration.namespace).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            kind: ObjectKind::from_type(
                non_empty(declaration.type_name).as_deref().unwrap_or(DEFAULT_SECRET_TYPE)
            ),
            data,
            binary_data_hash: sha256_hex(content),
        })
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn combined_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Decrypted on-disk shape of a secret declaration
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SecretDeclaration {
    target: String,
    #[serde(default)]
    target_type: Option<TargetType>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default, rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    data: BTreeMap<String, Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// File name of a declaration without its directory and well known suffix
pub fn secret_basename(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    strip_any_suffix(file_name, SECRET_FILE_SUFFIXES)
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_defaults() {
        let secret = Secret::from_declaration(
            "apps/db.gitops.secret.enc.yaml",
            b"target: clusterA\ndata:\n  user: u\n  port: 5432\n",
        ).unwrap();

        assert_eq!(secret.name, "db");
        assert_eq!(secret.namespace, "default");
        assert_eq!(secret.type_name(), "Opaque");
        assert_eq!(secret.target, "clusterA");
        assert_eq!(secret.target_type, TargetType::Kubernetes);
        assert_eq!(secret.data.get("port").map(String::as_str), Some("5432"));
        assert_eq!(secret.binary_data_hash.len(), 64);
    }

    #[test]
    fn test_declaration_explicit_fields() {
        let secret = Secret::from_declaration(
            "x.gitops.secret.enc.yml",
            b"target: prod\ntargetType: kubernetes\nname: my-explicitly-named-secret\nnamespace: web\ntype: kubernetes.io/dockerconfigjson\ndata: {}\n",
        ).unwrap();

        assert_eq!(secret.name, "my-explicitly-named-secret");
        assert_eq!(secret.namespace, "web");
        assert_eq!(
            secret.kind,
            ObjectKind::Secret { sub_type: "kubernetes.io/dockerconfigjson".to_string() }
        );
    }

    #[test]
    fn test_config_map_kind() {
        let secret = Secret::from_declaration(
            "cm.gitops.secret.enc.yml",
            b"target: prod\ntype: ConfigMap\ndata:\n  a: b\n",
        ).unwrap();
        assert!(secret.kind.is_config_map());
        assert_eq!(secret.type_name(), "ConfigMap");
    }

    #[test]
    fn test_rejects_wildcard_target_type() {
        let result = Secret::from_declaration(
            "x.gitops.secret.enc.yml",
            b"target: prod\ntargetType: all\n",
        );
        assert!(matches!(result, Err(EngineError::InvalidDeclaration { .. })));
    }

    #[test]
    fn test_rejects_nested_data() {
        let result = Secret::from_declaration(
            "x.gitops.secret.enc.yml",
            b"target: prod\ndata:\n  nested:\n    a: b\n",
        );
        assert!(matches!(result, Err(EngineError::InvalidDeclaration { .. })));
    }

    #[test]
    fn test_parse_error() {
        let result = Secret::from_declaration("x.gitops.secret.enc.yml", b"data: [\n");
        assert!(matches!(result, Err(EngineError::Parse { .. })));
    }

    #[test]
    fn test_target_type_filter() {
        assert!(TargetType::All.matches(TargetType::Vault));
        assert!(TargetType::Kubernetes.matches(TargetType::Kubernetes));
        assert!(!TargetType::Kubernetes.matches(TargetType::Vault));
    }

    #[test]
    fn test_secret_basename() {
        assert_eq!(secret_basename("a/b/implicit-name.gitops.secret.enc.yml"), "implicit-name");
        assert_eq!(secret_basename("plain.yaml"), "plain.yaml");
    }
}
