// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret as KubeSecret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{
    api::{Api, DeleteParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config, Resource,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gitops_common::constant::{KUBECONFIG_SECRET_SUFFIXES, SECRET_ID_ANNOTATION};
use gitops_common::telemetry::{debug, trace};
use gitops_common::utils::strip_any_suffix;

use crate::cluster::{ClusterConnector, ClusterObjectStore};
use crate::error::{EngineError, Result};
use crate::secret::{decrypt::Decryptor, ObjectKind, Secret};
use crate::state::ClusterState;

pub static FIELD_MANAGER: &str = "gitops";

/// Build a Kubernetes object from a local secret
pub trait FromSecret {
    fn from_secret(secret: &Secret) -> Self;
}

/// Read a Kubernetes object back into the secret model
pub trait IntoSecret {
    fn into_secret(self) -> Secret;
}

fn object_meta(secret: &Secret) -> ObjectMeta {
    let mut meta = ObjectMeta {
        name: Some(secret.name.clone()),
        namespace: Some(secret.namespace.clone()),
        ..Default::default()
    };
    if !secret.id.is_empty() {
        meta.annotations = Some(BTreeMap::from([(SECRET_ID_ANNOTATION.to_string(), secret.id.clone())]));
    }
    meta
}

fn remote_secret(meta: ObjectMeta, kind: ObjectKind, data: BTreeMap<String, String>) -> Secret {
    Secret {
        name: meta.name.unwrap_or_default(),
        namespace: meta.namespace.unwrap_or_default(),
        kind,
        data,
        ..Default::default()
    }
}

impl FromSecret for KubeSecret {
    fn from_secret(secret: &Secret) -> Self {
        KubeSecret {
            metadata: object_meta(secret),
            type_: Some(secret.type_name().to_string()),
            data: Some(
                secret.data
                    .iter()
                    .map(|(key, value)| (key.clone(), ByteString(value.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }
}

impl IntoSecret for KubeSecret {
    fn into_secret(self) -> Secret {
        let data = self.data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, String::from_utf8_lossy(&value.0).into_owned()))
            .collect();
        let kind = self.type_
            .map(|sub_type| ObjectKind::Secret { sub_type })
            .unwrap_or_default();

        remote_secret(self.metadata, kind, data)
    }
}

impl FromSecret for ConfigMap {
    fn from_secret(secret: &Secret) -> Self {
        ConfigMap {
            metadata: object_meta(secret),
            data: Some(secret.data.clone()),
            ..Default::default()
        }
    }
}

impl IntoSecret for ConfigMap {
    fn into_secret(self) -> Secret {
        remote_secret(self.metadata, ObjectKind::ConfigMap, self.data.unwrap_or_default())
    }
}

async fn get<T>(api: &Api<T>, name: &str) -> Result<Option<Secret>>
where
    T: Clone + Debug + DeserializeOwned + Resource<DynamicType = ()> + IntoSecret,
{
    match api.get(name).await {
        Ok(object) => Ok(Some(object.into_secret())),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(EngineError::from(e)),
    }
}

async fn create<T>(api: &Api<T>, secret: &Secret) -> Result<()>
where
    T: Clone + Debug + Serialize + DeserializeOwned + Resource<DynamicType = ()> + FromSecret,
{
    let params = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
    api.create(&params, &T::from_secret(secret)).await?;
    Ok(())
}

async fn replace<T>(api: &Api<T>, secret: &Secret) -> Result<()>
where
    T: Clone + Debug + Serialize + DeserializeOwned + Resource<DynamicType = ()> + FromSecret,
{
    let params = PostParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
    api.replace(&secret.name, &params, &T::from_secret(secret)).await?;
    Ok(())
}

async fn delete<T>(api: &Api<T>, name: &str) -> Result<()>
where
    T: Clone + Debug + DeserializeOwned + Resource<DynamicType = ()>,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!(event = "AlreadyDeleted", name = name);
            Ok(())
        }
        Err(e) => Err(EngineError::from(e)),
    }
}

/// Secrets and ConfigMaps of one cluster, through the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<KubeSecret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterObjectStore for KubeObjectStore {
    async fn server_version(&self) -> Result<String> {
        Ok(self.client.apiserver_version().await?.git_version)
    }

    async fn get(&self, kind: &ObjectKind, namespace: &str, name: &str) -> Result<Option<Secret>> {
        trace!(event = "Get", kind = %kind, namespace = namespace, name = name);
        match kind {
            ObjectKind::ConfigMap => get(&self.config_maps(namespace), name).await,
            ObjectKind::Secret { .. } => get(&self.secrets(namespace), name).await,
        }
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        match secret.kind {
            ObjectKind::ConfigMap => create(&self.config_maps(&secret.namespace), secret).await,
            ObjectKind::Secret { .. } => create(&self.secrets(&secret.namespace), secret).await,
        }
    }

    async fn update(&self, secret: &Secret) -> Result<()> {
        match secret.kind {
            ObjectKind::ConfigMap => replace(&self.config_maps(&secret.namespace), secret).await,
            ObjectKind::Secret { .. } => replace(&self.secrets(&secret.namespace), secret).await,
        }
    }

    async fn delete(&self, secret: &Secret) -> Result<()> {
        match secret.kind {
            ObjectKind::ConfigMap => delete(&self.config_maps(&secret.namespace), &secret.name).await,
            ObjectKind::Secret { .. } => delete(&self.secrets(&secret.namespace), &secret.name).await,
        }
    }
}

/// Where a cluster config file lives. Relative paths are relative to the repository root.
pub fn resolve_config_path(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Connects to clusters from kubeconfig files, decrypting encrypted ones first
pub struct KubeConnector {
    root: PathBuf,
    kubeconfig: Option<PathBuf>,
    decryptor: Arc<dyn Decryptor>,
}

impl KubeConnector {
    /// # Arguments
    /// * `root` - Directory relative cluster config paths are resolved against
    /// * `kubeconfig` - Explicit kubeconfig for the default cluster, otherwise inferred
    /// * `decryptor` - Used for `*.kubeconfig.secret.enc.yaml` files
    pub fn new(root: impl Into<PathBuf>, kubeconfig: Option<PathBuf>, decryptor: Arc<dyn Decryptor>) -> Self {
        Self { root: root.into(), kubeconfig, decryptor }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_config_path(&self.root, path)
    }

    async fn read_kubeconfig(&self, path: &Path) -> Result<Kubeconfig> {
        let kubeconfig_error = |message: String| EngineError::Kubeconfig { path: path.display().to_string(), message };

        let encrypted = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| strip_any_suffix(name, KUBECONFIG_SECRET_SUFFIXES).is_some());

        let raw = if encrypted {
            trace!(event = "DecryptingKubeconfig", path = %path.display());
            self.decryptor.decrypt(path).await?
        } else {
            tokio::fs::read(path).await.map_err(|e| kubeconfig_error(e.to_string()))?
        };

        let raw = String::from_utf8(raw).map_err(|e| kubeconfig_error(e.to_string()))?;
        Kubeconfig::from_yaml(&raw).map_err(|e| kubeconfig_error(e.to_string()))
    }

    async fn client_from_file(&self, path: &Path) -> Result<Client> {
        let kubeconfig = self.read_kubeconfig(path).await?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| EngineError::Kubeconfig { path: path.display().to_string(), message: e.to_string() })?;

        Ok(Client::try_from(config)?)
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect_default(&self) -> Result<Arc<dyn ClusterObjectStore>> {
        let client = match &self.kubeconfig {
            Some(path) => self.client_from_file(&self.resolve(path)).await?,
            None => {
                let config = Config::infer().await.map_err(|e| EngineError::Kubeconfig {
                    path: "<inferred>".to_string(),
                    message: e.to_string(),
                })?;
                Client::try_from(config)?
            }
        };

        Ok(Arc::new(KubeObjectStore::new(client)))
    }

    async fn connect(&self, cluster: &ClusterState) -> Result<Arc<dyn ClusterObjectStore>> {
        let path = self.resolve(Path::new(&cluster.config_file));
        debug!(event = "ConnectingCluster", cluster = cluster.name.as_str(), config = %path.display());

        let client = self.client_from_file(&path).await?;
        Ok(Arc::new(KubeObjectStore::new(client)))
    }
}
