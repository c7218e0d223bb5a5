// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use gitops_common::constant::SECRET_FILE_SUFFIXES;
use gitops_common::telemetry::{debug, info, trace};
use gitops_common::utils::{normalize_relative_path, strip_any_suffix};

use crate::error::{EngineError, Result};
use crate::pool::WorkerPool;
use crate::secret::{decrypt::Decryptor, templating::{is_values_file, TemplateValues}, Secret, TargetType};

/// Limits narrowing a run to part of the repository and/or one cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Path prefix, relative to the root and slash-normalized
    pub directory: Option<String>,
    /// Target cluster name
    pub cluster: Option<String>,
}

impl Scope {
    pub fn new(directory: Option<&str>, cluster: Option<&str>) -> Self {
        Self {
            directory: directory
                .map(normalize_relative_path)
                .filter(|d| !d.is_empty()),
            cluster: cluster
                .filter(|c| !c.is_empty())
                .map(ToString::to_string),
        }
    }

    pub fn includes_path(&self, path: &str) -> bool {
        self.directory.as_deref().is_none_or(|dir| path.starts_with(dir))
    }

    pub fn includes_target(&self, target: &str) -> bool {
        self.cluster.as_deref().is_none_or(|cluster| cluster == target)
    }

    pub fn includes(&self, path: &str, target: &str) -> bool {
        self.includes_path(path) && self.includes_target(target)
    }
}

/// Discovers, decrypts and parses local secret declarations
pub struct SecretLoader {
    root: PathBuf,
    decryptor: Arc<dyn Decryptor>,
    parallelism: usize,
}

impl SecretLoader {
    pub fn new(root: impl Into<PathBuf>, decryptor: Arc<dyn Decryptor>, parallelism: usize) -> Self {
        Self {
            root: root.into(),
            decryptor,
            parallelism: parallelism.max(1),
        }
    }

    /// Every declaration and values file under the root, as sorted relative paths
    pub fn discover(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else { continue };
            if strip_any_suffix(file_name, SECRET_FILE_SUFFIXES).is_none() {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let relative = normalize_relative_path(&relative.to_string_lossy());
            trace!(event = "FoundSecretFile", path = relative.as_str());
            files.push(relative);
        }

        files.sort();
        Ok(files)
    }

    async fn load_values(&self, files: &[String]) -> Result<TemplateValues> {
        let mut decrypted = Vec::new();
        for path in files.iter().filter(|path| is_values_file(path)) {
            debug!(event = "LoadingValues", path = path.as_str());
            decrypted.push((path.clone(), self.decryptor.decrypt(&self.root.join(path)).await?));
        }
        TemplateValues::from_files(decrypted)
    }

    /// Load every local secret matching the target type filter and scope.
    ///
    /// Any decryption or parse failure aborts the whole load, as does two
    /// secrets sharing name, target and namespace.
    pub async fn load_local_secrets(&self, target_type: TargetType, scope: &Scope) -> Result<Vec<Secret>> {
        let files = self.discover()?;
        let values = Arc::new(self.load_values(&files).await?);

        let candidates: Vec<(usize, String)> = files
            .into_iter()
            .filter(|path| !is_values_file(path))
            .filter(|path| {
                let included = scope.includes_path(path);
                if !included {
                    trace!(event = "SkippingSecret", reason = "directory", path = path.as_str());
                }
                included
            })
            .enumerate()
            .collect();
        let total = candidates.len();

        let root = self.root.clone();
        let decryptor = self.decryptor.clone();
        let mut pool = WorkerPool::spawn(candidates, self.parallelism, move |(index, path): (usize, String)| {
            let root = root.clone();
            let decryptor = decryptor.clone();
            let values = values.clone();
            async move {
                let result = load_secret(decryptor.as_ref(), &values, &root, &path).await;
                (index, result)
            }
        });

        let mut loaded = Vec::with_capacity(total);
        while let Some((index, result)) = pool.next().await {
            let secret = result?;
            debug!(event = "SecretLoaded", path = secret.path.as_str(), progress = loaded.len() + 1, total = total);
            loaded.push((index, secret));
        }
        pool.join().await?;

        loaded.sort_by_key(|(index, _)| *index);

        let secrets: Vec<Secret> = loaded
            .into_iter()
            .map(|(_, secret)| secret)
            .filter(|secret| {
                if !target_type.matches(secret.target_type) {
                    trace!(event = "SkippingSecret", reason = "target_type", path = secret.path.as_str());
                    return false;
                }
                if !scope.includes_target(&secret.target) {
                    trace!(event = "SkippingSecret", reason = "cluster", path = secret.path.as_str());
                    return false;
                }
                true
            })
            .collect();

        check_unique(&secrets)?;

        info!(event = "LoadedLocalSecrets", count = secrets.len(), target_type = %target_type);
        Ok(secrets)
    }
}

async fn load_secret(decryptor: &dyn Decryptor, values: &TemplateValues, root: &Path, path: &str) -> Result<Secret> {
    let decrypted = decryptor.decrypt(&root.join(path)).await?;
    let rendered = values.render(path, decrypted)?;
    Secret::from_declaration(path, &rendered)
}

fn check_unique(secrets: &[Secret]) -> Result<()> {
    let mut seen: HashMap<(&str, &str, &str), &str> = HashMap::with_capacity(secrets.len());

    for secret in secrets {
        let key = (secret.name.as_str(), secret.target.as_str(), secret.namespace.as_str());
        if let Some(first) = seen.insert(key, secret.path.as_str()) {
            return Err(EngineError::DuplicateSecret {
                name: secret.name.clone(),
                target: secret.target.clone(),
                namespace: secret.namespace.clone(),
                first: first.to_string(),
                second: secret.path.clone(),
            });
        }
    }

    Ok(())
}
