// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::path::Path;
use serde::{Serialize, Deserialize};
use figment::{Figment, Error, providers::{Format, Json, Yaml, Env, Serialized}};

use crate::constant::{ENV_PREFIX, DEFAULT_STATE_FILE, DEFAULT_PARALLELISM};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Repository root to scan. Falls back to the enclosing git repository.
    #[serde(default)]
    pub root_dir: Option<String>,
    /// State file location, relative to the root directory
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Kubeconfig for the default cluster
    #[serde(default)]
    pub kubeconfig: Option<String>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Print sensitive values unredacted
    #[serde(default)]
    pub cleartext: bool,
    #[serde(default)]
    pub sops: SopsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Worker count for the loader and executor pools, never below one
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            root_dir: None,
            state_file: default_state_file(),
            kubeconfig: None,
            parallelism: default_parallelism(),
            cleartext: false,
            sops: SopsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SopsConfig {
    #[serde(default)]
    pub binary: String,
}

impl Default for SopsConfig {
    fn default() -> Self {
        SopsConfig {
            binary: "sops".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

pub struct AppConfigBuilder {
    figment: Figment,
}

impl AppConfigBuilder {
    pub fn with_file(&mut self, path: &str) -> &mut Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        self.figment = match extension {
            "json" => self.figment.clone().merge(Json::file(path)),
            "yaml" | "yml" => self.figment.clone().merge(Yaml::file(path)),
            _ => self.figment.clone(),
        };
        self
    }

    pub fn with_env(&mut self) -> &mut Self {
        self.figment = self.figment.clone().merge(Env::prefixed(&format!("{}__", ENV_PREFIX)).split("__"));
        self
    }

    pub fn with_override_option(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.figment = self.figment.clone().merge(Serialized::default(key, value));
        }
        self
    }

    pub fn with_override_value<T: Serialize>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.figment = self.figment.clone().merge(Serialized::default(key, value));
        }
        self
    }

    pub fn build(&self) -> Result<AppConfig, Error> {
        self.figment.extract()
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        AppConfigBuilder {
            figment: Figment::from(Serialized::defaults(AppConfig::default()))
        }
    }
}
