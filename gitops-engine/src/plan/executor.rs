// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::sync::Arc;

use gitops_common::telemetry::{debug, error, info};

use crate::cluster::ClusterRegistry;
use crate::error::{EngineError, Result};
use crate::plan::{Plan, PlanItem};
use crate::pool::WorkerPool;
use crate::secret::{diff::DiffType, TargetType};

async fn apply_item(registry: &ClusterRegistry, item: &PlanItem) -> Result<()> {
    match (item.diff.diff_type, &item.local_secret, &item.remote_secret) {
        (DiffType::Added, Some(local), _) => {
            debug!(event = "Creating", secret = %local.combined_name(), target = local.target.as_str());
            registry.create(local).await
        }
        (DiffType::Changed, Some(local), _) => {
            debug!(event = "Updating", secret = %local.combined_name(), target = local.target.as_str());
            registry.update(local).await
        }
        (DiffType::Removed, _, Some(remote)) => {
            debug!(event = "Deleting", secret = %remote.combined_name(), target = remote.target.as_str());
            registry.delete(remote).await
        }
        _ => Ok(()),
    }
}

impl Plan {
    /// Apply every item that is not already in sync.
    ///
    /// All items are attempted even when some fail; the first failure is
    /// returned once every worker has finished, so the cluster may be partly
    /// updated on error. Re-running converges.
    pub async fn execute(&self, registry: Arc<ClusterRegistry>, parallelism: usize) -> Result<()> {
        if self.target_type != TargetType::Kubernetes {
            return Err(EngineError::UnsupportedTargetType(self.target_type.to_string()));
        }

        let pending: Vec<PlanItem> = self.items.iter().filter(|item| !item.diff.equal).cloned().collect();
        if pending.is_empty() {
            debug!(event = "NothingToApply");
            return Ok(());
        }
        let total = pending.len();

        let mut pool = WorkerPool::spawn(pending, parallelism, move |item: PlanItem| {
            let registry = registry.clone();
            async move {
                let result = apply_item(&registry, &item).await;
                (item.diff.combined_name(), result)
            }
        });

        let mut first_error = None;
        let mut failed = 0;
        while let Some((name, result)) = pool.next().await {
            if let Err(e) = result {
                error!(event = "ApplyFailed", secret = name.as_str(), error = %e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
        pool.join().await?;

        info!(event = "PlanExecuted", applied = total - failed, failed = failed);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
