// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

pub mod kubernetes;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use gitops_common::constant::DEFAULT_CLUSTER_NAME;
use gitops_common::telemetry::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::secret::{ObjectKind, Secret};
use crate::state::ClusterState;

/// Get/create/update/delete of Secret and ConfigMap objects in one cluster
#[async_trait]
pub trait ClusterObjectStore: Send + Sync {
    /// Reachability probe, returning the server's version string
    async fn server_version(&self) -> Result<String>;

    /// Fetch an object. A missing object is `Ok(None)`, never an error.
    async fn get(&self, kind: &ObjectKind, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create(&self, secret: &Secret) -> Result<()>;

    async fn update(&self, secret: &Secret) -> Result<()>;

    async fn delete(&self, secret: &Secret) -> Result<()>;
}

/// Produces object stores from cluster credentials
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// The ambient cluster (explicit kubeconfig, the environment or in-cluster)
    async fn connect_default(&self) -> Result<Arc<dyn ClusterObjectStore>>;

    async fn connect(&self, cluster: &ClusterState) -> Result<Arc<dyn ClusterObjectStore>>;
}

/// One named cluster and the result of probing it at registration
pub struct ClusterClient {
    pub name: String,
    pub connected: bool,
    pub server_version: Option<String>,
    store: Arc<dyn ClusterObjectStore>,
}

impl ClusterClient {
    /// Register a store under `name`, probing it once. An unreachable cluster
    /// is still registered and fails on its first real operation.
    pub async fn register(name: &str, store: Arc<dyn ClusterObjectStore>) -> Self {
        let (connected, server_version) = match store.server_version().await {
            Ok(version) => {
                debug!(event = "ClusterConnected", cluster = name, version = version.as_str());
                (true, Some(version))
            }
            Err(e) => {
                warn!(event = "ClusterUnreachable", cluster = name, error = %e);
                (false, None)
            }
        };

        Self { name: name.to_string(), connected, server_version, store }
    }

    pub fn store(&self) -> &Arc<dyn ClusterObjectStore> {
        &self.store
    }

    /// Re-run the connectivity probe
    pub async fn test_connection(&self) -> Result<String> {
        self.store.server_version().await
    }
}

/// Every cluster client for one run, keyed by cluster name
#[derive(Default)]
pub struct ClusterRegistry {
    clients: BTreeMap<String, Arc<ClusterClient>>,
}

impl ClusterRegistry {
    /// Register the default cluster plus every configured cluster.
    ///
    /// The default cluster is best effort: without it the registry is still
    /// usable as long as at least one named cluster is configured. Named
    /// clusters whose credentials cannot be loaded are skipped with a warning
    /// and surface as unknown clusters when used.
    pub async fn init_clusters<'a>(
        connector: &dyn ClusterConnector,
        clusters: impl IntoIterator<Item = &'a ClusterState>,
    ) -> Result<Self> {
        let clusters: Vec<&ClusterState> = clusters.into_iter().collect();
        let mut registry = Self::default();

        match connector.connect_default().await {
            Ok(store) => registry.insert(ClusterClient::register(DEFAULT_CLUSTER_NAME, store).await),
            Err(e) if clusters.is_empty() => {
                warn!(event = "NoDefaultCluster", error = %e);
                return Err(EngineError::NoDefaultCluster);
            }
            Err(e) => warn!(event = "NoDefaultCluster", error = %e),
        }

        for cluster in clusters {
            match connector.connect(cluster).await {
                Ok(store) => registry.insert(ClusterClient::register(&cluster.name, store).await),
                Err(e) => warn!(event = "ClusterConfigInvalid", cluster = cluster.name.as_str(), error = %e),
            }
        }

        info!(event = "ClustersInitialized", count = registry.clients.len());
        Ok(registry)
    }

    pub fn insert(&mut self, client: ClusterClient) {
        self.clients.insert(client.name.clone(), Arc::new(client));
    }

    pub fn client(&self, name: &str) -> Result<&Arc<ClusterClient>> {
        self.clients
            .get(name)
            .ok_or_else(|| EngineError::UnknownCluster(name.to_string()))
    }

    /// Registered clients in name order
    pub fn clients(&self) -> impl Iterator<Item = &Arc<ClusterClient>> {
        self.clients.values()
    }

    /// Probe every cluster concurrently, in name order
    pub async fn test_connections(&self) -> Vec<(String, Result<String>)> {
        join_all(self.clients.values().map(|client| async move {
            (client.name.clone(), client.test_connection().await)
        }))
        .await
    }

    /// Fetch the object a secret describes from its target cluster.
    /// The returned secret carries the cluster name as its target.
    pub async fn get(&self, kind: &ObjectKind, target: &str, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let client = self.client(target)?;
        let remote = client.store.get(kind, namespace, name).await?;

        Ok(remote.map(|mut secret| {
            secret.target = client.name.clone();
            secret
        }))
    }

    pub async fn get_secret(&self, secret: &Secret) -> Result<Option<Secret>> {
        self.get(&secret.kind, &secret.target, &secret.namespace, &secret.name).await
    }

    pub async fn create(&self, secret: &Secret) -> Result<()> {
        self.client(&secret.target)?.store.create(secret).await
    }

    pub async fn update(&self, secret: &Secret) -> Result<()> {
        self.client(&secret.target)?.store.update(secret).await
    }

    pub async fn delete(&self, secret: &Secret) -> Result<()> {
        self.client(&secret.target)?.store.delete(secret).await
    }
}
