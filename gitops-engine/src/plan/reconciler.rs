// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::collections::HashSet;
use std::sync::Arc;

use gitops_common::telemetry::{debug, info, trace};

use crate::cluster::{ClusterConnector, ClusterRegistry};
use crate::error::{EngineError, Result};
use crate::plan::{Plan, PlanItem};
use crate::secret::{loader::{Scope, SecretLoader}, ObjectKind, Secret, TargetType};
use crate::state::{SecretState, StateStore};

/// Where an object lives in a cluster. Secrets of different sub-types share a
/// location, a ConfigMap of the same name does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObjectLocation {
    target: String,
    namespace: String,
    name: String,
    config_map: bool,
}

impl ObjectLocation {
    fn of_secret(secret: &Secret) -> Self {
        Self {
            target: secret.target.clone(),
            namespace: secret.namespace.clone(),
            name: secret.name.clone(),
            config_map: secret.kind.is_config_map(),
        }
    }

    fn of_state(state: &SecretState) -> Self {
        Self {
            target: state.target.clone(),
            namespace: state.namespace.clone(),
            name: state.name.clone(),
            config_map: state.kind().is_config_map(),
        }
    }

    fn kind(&self) -> ObjectKind {
        if self.config_map {
            ObjectKind::ConfigMap
        } else {
            ObjectKind::default()
        }
    }
}

/// Owns the state and cluster clients of one run and turns local
/// declarations into a plan
pub struct Reconciler {
    state: StateStore,
    registry: Arc<ClusterRegistry>,
    loader: SecretLoader,
}

impl Reconciler {
    pub fn new(state: StateStore, registry: Arc<ClusterRegistry>, loader: SecretLoader) -> Self {
        Self { state, registry, loader }
    }

    /// Connect to the default cluster and every cluster recorded in state
    pub async fn connect(state: StateStore, connector: &dyn ClusterConnector, loader: SecretLoader) -> Result<Self> {
        let registry = ClusterRegistry::init_clusters(connector, state.clusters()).await?;
        Ok(Self::new(state, Arc::new(registry), loader))
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn registry(&self) -> Arc<ClusterRegistry> {
        self.registry.clone()
    }

    async fn fetch(&self, location: &ObjectLocation) -> Result<Option<Secret>> {
        self.registry
            .get(&location.kind(), &location.target, &location.namespace, &location.name)
            .await
    }

    /// Build the plan for every local secret in scope, plus removals for
    /// objects whose declarations have gone away.
    ///
    /// State is updated in memory only: new paths get an identity, known
    /// paths are refreshed and orphaned paths in scope are dropped.
    pub async fn build_plan(&mut self, target_type: TargetType, scope: &Scope) -> Result<Plan> {
        if target_type != TargetType::Kubernetes {
            return Err(EngineError::UnsupportedTargetType(target_type.to_string()));
        }

        info!(
            event = "BuildingPlan",
            target_type = %target_type,
            directory = scope.directory.as_deref().unwrap_or_default(),
            cluster = scope.cluster.as_deref().unwrap_or_default(),
        );

        let locals = self.loader.load_local_secrets(target_type, scope).await?;
        let seen: HashSet<String> = locals.iter().map(|s| s.path.clone()).collect();
        let claimed: HashSet<ObjectLocation> = locals.iter().map(ObjectLocation::of_secret).collect();

        let mut plan = Plan::new(target_type);
        let mut relocated = Vec::new();

        for mut secret in locals {
            let previous = match self.state.get_by_path_mut(&secret.path) {
                Some(existing) => {
                    trace!(event = "KnownSecret", secret = %secret.combined_name(), id = existing.id.as_str());
                    let previous = ObjectLocation::of_state(existing);
                    // The old object can only be removed from a run that covers its cluster
                    if !scope.includes_target(&previous.target) && previous != ObjectLocation::of_secret(&secret) {
                        info!(
                            event = "RetargetDeferred",
                            path = secret.path.as_str(),
                            from = previous.target.as_str(),
                            to = secret.target.as_str(),
                        );
                        continue;
                    }
                    existing.update(&mut secret);
                    Some(previous)
                }
                None => {
                    trace!(event = "NewSecret", secret = %secret.combined_name());
                    self.state.add(&mut secret);
                    None
                }
            };

            if let Some(previous) = previous.filter(|p| *p != ObjectLocation::of_secret(&secret)) {
                relocated.push(previous);
            }

            let remote = self.registry.get_secret(&secret).await?;
            plan.add_item(PlanItem::new(Some(secret), remote));
        }

        // A declaration that now describes a different object leaves its old one behind
        for previous in relocated {
            if claimed.contains(&previous) {
                continue;
            }
            if let Some(remote) = self.fetch(&previous).await? {
                debug!(event = "RelocatedSecret", secret = %remote.combined_name(), target = previous.target.as_str());
                plan.add_item(PlanItem::new(None, Some(remote)));
            }
        }

        let mut retained = Vec::with_capacity(self.state.secrets().len());
        for entry in self.state.secrets().to_vec() {
            if seen.contains(&entry.path) || !scope.includes(&entry.path, &entry.target) {
                retained.push(entry);
                continue;
            }

            let location = ObjectLocation::of_state(&entry);
            if claimed.contains(&location) {
                debug!(event = "OrphanReclaimed", path = entry.path.as_str(), secret = %entry.combined_name());
                continue;
            }

            match self.fetch(&location).await? {
                Some(remote) => {
                    debug!(event = "OrphanedSecret", path = entry.path.as_str(), secret = %entry.combined_name());
                    plan.add_item(PlanItem::new(None, Some(remote)));
                }
                None => {
                    debug!(event = "OrphanGone", path = entry.path.as_str(), secret = %entry.combined_name());
                }
            }
        }
        self.state.set_secrets(retained);

        let (add, change, remove) = plan.summary();
        info!(event = "PlanBuilt", items = plan.items.len(), add = add, change = change, remove = remove);

        Ok(plan)
    }
}
