// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use uuid::Uuid;

use gitops_common::telemetry::{debug, info};

use crate::error::{EngineError, Result};
use crate::secret::{ObjectKind, Secret};

/// Persisted identity of one local declaration, keyed by its path
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SecretState {
    #[serde(rename = "ID")]
    pub id: String,
    pub target: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "Type")]
    pub type_name: String,
    pub path: String,
    #[serde(default)]
    pub binary_data_hash: String,
}

impl SecretState {
    fn from_secret(secret: &Secret) -> Self {
        Self {
            id: secret.id.clone(),
            target: secret.target.clone(),
            name: secret.name.clone(),
            namespace: secret.namespace.clone(),
            type_name: secret.type_name().to_string(),
            path: secret.path.clone(),
            binary_data_hash: secret.binary_data_hash.clone(),
        }
    }

    /// Track the latest declaration for this path while keeping the identity.
    /// The record's ID is written back onto `secret`.
    pub fn update(&mut self, secret: &mut Secret) {
        secret.id = self.id.clone();
        self.target = secret.target.clone();
        self.name = secret.name.clone();
        self.namespace = secret.namespace.clone();
        self.type_name = secret.type_name().to_string();
        self.binary_data_hash = secret.binary_data_hash.clone();
    }

    pub fn kind(&self) -> ObjectKind {
        ObjectKind::from_type(&self.type_name)
    }

    pub fn combined_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterState {
    pub name: String,
    /// Kubeconfig for the cluster, possibly encrypted
    pub config_file: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct State {
    #[serde(default)]
    pub secrets: Vec<SecretState>,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterState>,
}

/// The state file and its in-memory contents for one run
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: State,
    crlf: bool,
}

impl StateStore {
    /// Load the state file, starting from an empty state if it does not exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let raw = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(EngineError::State(format!("state file {} is a directory", path.display())));
            }
            Ok(_) => fs::read_to_string(&path)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(event = "NewState", path = %path.display());
                return Ok(Self { path, state: State::default(), crlf: false });
            }
            Err(e) => return Err(e.into()),
        };

        let crlf = raw.contains("\r\n");
        let normalized = if crlf { raw.replace("\r\n", "\n") } else { raw };

        let state = if normalized.trim().is_empty() {
            State::default()
        } else {
            serde_yaml::from_str(&normalized)
                .map_err(|e| EngineError::State(format!("failed to decode {}: {}", path.display(), e)))?
        };

        debug!(event = "LoadedState", path = %path.display(), secrets = state.secrets.len(), clusters = state.clusters.len());
        Ok(Self { path, state, crlf })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn secrets(&self) -> &[SecretState] {
        &self.state.secrets
    }

    pub fn get_by_path(&self, path: &str) -> Option<&SecretState> {
        self.state.secrets.iter().find(|s| s.path == path)
    }

    pub fn get_by_path_mut(&mut self, path: &str) -> Option<&mut SecretState> {
        self.state.secrets.iter_mut().find(|s| s.path == path)
    }

    /// Record a path seen for the first time under a fresh identity
    pub fn add(&mut self, secret: &mut Secret) -> &SecretState {
        secret.id = Uuid::new_v4().to_string();
        debug!(event = "AssignedIdentity", path = secret.path.as_str(), id = secret.id.as_str());

        self.state.secrets.push(SecretState::from_secret(secret));
        &self.state.secrets[self.state.secrets.len() - 1]
    }

    pub fn set_secrets(&mut self, secrets: Vec<SecretState>) {
        self.state.secrets = secrets;
    }

    /// Atomically rewrite the state file
    pub fn save(&self) -> Result<()> {
        let mut encoded = serde_yaml::to_string(&self.state).map_err(EngineError::StateEncode)?;
        if self.crlf {
            encoded = encoded.replace('\n', "\r\n");
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(encoded.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| EngineError::StateIo(e.error))?;

        info!(event = "SavedState", path = %self.path.display(), secrets = self.state.secrets.len());
        Ok(())
    }

    pub fn cluster(&self, name: &str) -> Result<&ClusterState> {
        self.state
            .clusters
            .get(name)
            .ok_or_else(|| EngineError::UnknownCluster(name.to_string()))
    }

    /// Configured clusters in name order
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterState> {
        self.state.clusters.values()
    }

    pub fn add_cluster(&mut self, cluster: ClusterState) -> Result<()> {
        if self.state.clusters.contains_key(&cluster.name) {
            return Err(EngineError::ClusterExists(cluster.name));
        }
        info!(event = "AddedCluster", cluster = cluster.name.as_str());
        self.state.clusters.insert(cluster.name.clone(), cluster);
        Ok(())
    }

    pub fn remove_cluster(&mut self, name: &str) -> Result<ClusterState> {
        let removed = self
            .state
            .clusters
            .remove(name)
            .ok_or_else(|| EngineError::UnknownCluster(name.to_string()))?;
        info!(event = "RemovedCluster", cluster = name);
        Ok(removed)
    }
}
