// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use gitops_common::telemetry::trace;

use crate::error::{EngineError, Result};

/// Turns an encrypted file on disk into its cleartext bytes
#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Decrypts files by invoking the `sops` binary
#[derive(Debug, Clone)]
pub struct SopsDecryptor {
    binary: PathBuf,
}

impl SopsDecryptor {
    /// Resolve the sops binary on `PATH` (or use it as given if it is a path)
    pub fn new(binary: &str) -> Result<Self> {
        let binary = which::which(binary).map_err(|e| EngineError::Decrypt {
            path: binary.to_string(),
            message: format!("sops binary not found: {}", e),
        })?;

        Ok(Self { binary })
    }
}

#[async_trait]
impl Decryptor for SopsDecryptor {
    async fn decrypt(&self, path: &Path) -> Result<Vec<u8>> {
        trace!(event = "Decrypting", path = %path.display());

        let output = Command::new(&self.binary)
            .arg("--decrypt")
            .arg("--output-type")
            .arg("yaml")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Decrypt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::Decrypt {
                path: path.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
