// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub const ENV_PREFIX: &str = "GITOPS";

pub const DEFAULT_STATE_FILE: &str = ".gitops-state.yaml";
pub const DEFAULT_PARALLELISM: usize = 5;
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Reserved `type` value selecting the ConfigMap object kind
pub const CONFIG_MAP_TYPE: &str = "ConfigMap";

/// Annotation carrying the stable secret ID on every object written to a cluster
pub const SECRET_ID_ANNOTATION: &str = "gitops/secret-id";

pub const SECRET_FILE_SUFFIXES: &[&str] = &[".gitops.secret.enc.yml", ".gitops.secret.enc.yaml"];
pub const VALUES_FILE_NAMES: &[&str] = &["values.gitops.secret.enc.yml", "values.gitops.secret.enc.yaml"];
pub const KUBECONFIG_SECRET_SUFFIXES: &[&str] = &[".kubeconfig.secret.enc.yml", ".kubeconfig.secret.enc.yaml"];

/// Upper bound on the number of `*` characters used to redact a value
pub const REDACTION_MAX_LEN: usize = 50;
