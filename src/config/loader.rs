// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration file loading.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::Config;
use super::utils::expand_tilde;
use crate::error::{Error, Result};

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path).await.map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {e}",
                expanded_path.display()
            ))
        })?;

        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", expanded_path.display())),
            other => other,
        })
    }

    /// Parse YAML text. An empty document yields the defaults.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
    }

    /// Load from `explicit` if given, otherwise from the default location.
    pub async fn load_with_priority(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let expanded = expand_tilde(path);
                if !expanded.exists() {
                    return Err(Error::Config(format!(
                        "config file {} does not exist",
                        expanded.display()
                    )));
                }
                Self::load(&expanded).await
            }
            None => match default_config_path() {
                Some(path) => Self::load(&path).await,
                None => Ok(Self::default()),
            },
        }
    }
}

/// `$XDG_CONFIG_HOME/jupyter-o2/config.yaml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "jupyter-o2").map(|dirs| dirs.config_dir().join("config.yaml"))
}
