// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to decrypt {path}: {message}")]
    Decrypt { path: String, message: String },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to render {path}: {message}")]
    Template { path: String, message: String },
    #[error("invalid secret declaration {path}: {message}")]
    InvalidDeclaration { path: String, message: String },
    #[error(
        "duplicate secret {namespace}/{name} for target {target}: declared in '{first}' and '{second}'"
    )]
    DuplicateSecret {
        name: String,
        target: String,
        namespace: String,
        first: String,
        second: String,
    },
    #[error("failed to discover secret files: {0}")]
    Discovery(#[from] walkdir::Error),
    #[error("state error: {0}")]
    State(String),
    #[error("state file i/o error: {0}")]
    StateIo(#[from] std::io::Error),
    #[error("failed to encode state: {0}")]
    StateEncode(serde_yaml::Error),
    #[error("cluster '{0}' not found")]
    UnknownCluster(String),
    #[error("cluster '{0}' already exists")]
    ClusterExists(String),
    #[error("no default cluster config available and no clusters configured")]
    NoDefaultCluster,
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("invalid kubeconfig {path}: {message}")]
    Kubeconfig { path: String, message: String },
    #[error("unsupported target type: {0}")]
    UnsupportedTargetType(String),
    #[error("worker error: {0}")]
    Worker(String),
}

pub type Result<T> = result::Result<T, EngineError>;
