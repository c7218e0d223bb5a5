// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use gitops_engine::cluster::{ClusterConnector, ClusterObjectStore};
use gitops_engine::error::{EngineError, Result};
use gitops_engine::plan::reconciler::Reconciler;
use gitops_engine::secret::{decrypt::Decryptor, loader::SecretLoader, ObjectKind, Secret};
use gitops_engine::state::{ClusterState, StateStore};

pub const STATE_FILE: &str = ".gitops-state.yaml";

/// Reads declarations as plain text
pub struct PlaintextDecryptor;

#[async_trait]
impl Decryptor for PlaintextDecryptor {
    async fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}

type Key = (bool, String, String);

/// A cluster held in memory. Objects are keyed by kind, namespace and name.
#[derive(Default)]
pub struct InMemoryCluster {
    objects: Mutex<BTreeMap<Key, Secret>>,
    failing: Mutex<HashSet<String>>,
    writes: Mutex<usize>,
}

impl InMemoryCluster {
    fn key(kind: &ObjectKind, namespace: &str, name: &str) -> Key {
        (kind.is_config_map(), namespace.to_string(), name.to_string())
    }

    /// Make writes of objects with this name fail until cleared
    pub fn fail_writes_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Stored object, including the ID it was written with
    pub fn object(&self, kind: &ObjectKind, namespace: &str, name: &str) -> Option<Secret> {
        self.objects.lock().unwrap().get(&Self::key(kind, namespace, name)).cloned()
    }

    pub fn insert(&self, secret: Secret) {
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(&secret.kind, &secret.namespace, &secret.name), secret);
    }

    pub fn remove(&self, kind: &ObjectKind, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&Self::key(kind, namespace, name));
    }

    /// Contents comparable across clusters: kind, namespace, name and data
    pub fn snapshot(&self) -> BTreeMap<Key, BTreeMap<String, String>> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, secret)| (key.clone(), secret.data.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    fn write(&self, secret: &Secret) -> Result<()> {
        *self.writes.lock().unwrap() += 1;
        if self.failing.lock().unwrap().contains(&secret.name) {
            return Err(EngineError::Worker(format!("injected failure for {}", secret.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterObjectStore for InMemoryCluster {
    async fn server_version(&self) -> Result<String> {
        Ok("v1.30.0".to_string())
    }

    async fn get(&self, kind: &ObjectKind, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.object(kind, namespace, name).map(|stored| Secret {
            name: stored.name,
            namespace: stored.namespace,
            kind: stored.kind,
            data: stored.data,
            ..Default::default()
        }))
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        self.write(secret)?;
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(&secret.kind, &secret.namespace, &secret.name);
        if objects.contains_key(&key) {
            return Err(EngineError::Worker(format!("{} already exists", secret.combined_name())));
        }
        objects.insert(key, secret.clone());
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> Result<()> {
        self.write(secret)?;
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(&secret.kind, &secret.namespace, &secret.name);
        if !objects.contains_key(&key) {
            return Err(EngineError::Worker(format!("{} not found", secret.combined_name())));
        }
        objects.insert(key, secret.clone());
        Ok(())
    }

    async fn delete(&self, secret: &Secret) -> Result<()> {
        self.write(secret)?;
        self.remove(&secret.kind, &secret.namespace, &secret.name);
        Ok(())
    }
}

/// Hands out in-memory clusters by name
#[derive(Clone, Default)]
pub struct FakeConnector {
    clusters: HashMap<String, Arc<InMemoryCluster>>,
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect_default(&self) -> Result<Arc<dyn ClusterObjectStore>> {
        match self.clusters.get("default") {
            Some(cluster) => Ok(cluster.clone()),
            None => Err(EngineError::NoDefaultCluster),
        }
    }

    async fn connect(&self, cluster: &ClusterState) -> Result<Arc<dyn ClusterObjectStore>> {
        match self.clusters.get(&cluster.name) {
            Some(store) => Ok(store.clone()),
            None => Err(EngineError::UnknownCluster(cluster.name.clone())),
        }
    }
}

/// A repository root with its state file and a set of in-memory clusters
pub struct Harness {
    pub root: TempDir,
    pub connector: FakeConnector,
}

impl Harness {
    /// Clusters other than `default` are recorded in the state file
    pub fn new(clusters: &[&str]) -> Self {
        let root = TempDir::new().unwrap();
        let connector = FakeConnector {
            clusters: clusters
                .iter()
                .map(|name| (name.to_string(), Arc::new(InMemoryCluster::default())))
                .collect(),
        };

        let mut state = StateStore::load(root.path().join(STATE_FILE)).unwrap();
        for name in clusters.iter().filter(|name| **name != "default") {
            state
                .add_cluster(ClusterState { name: name.to_string(), config_file: format!("{}.kubeconfig", name) })
                .unwrap();
        }
        state.save().unwrap();

        Self { root, connector }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).unwrap();
    }

    pub fn cluster(&self, name: &str) -> Arc<InMemoryCluster> {
        self.connector.clusters[name].clone()
    }

    pub fn state(&self) -> StateStore {
        StateStore::load(self.path(STATE_FILE)).unwrap()
    }

    pub async fn reconciler(&self, parallelism: usize) -> Reconciler {
        let loader = SecretLoader::new(self.root.path(), Arc::new(PlaintextDecryptor), parallelism);
        Reconciler::connect(self.state(), &self.connector, loader).await.unwrap()
    }
}
