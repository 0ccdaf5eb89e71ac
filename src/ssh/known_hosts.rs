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

use directories::BaseDirs;
use russh::keys::known_hosts;
use russh::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Mode for host key checking against `~/.ssh/known_hosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyChecking {
    /// Reject unknown and changed keys.
    Yes,
    /// Accept any key.
    No,
    /// Learn unknown keys, reject changed ones.
    #[default]
    AcceptNew,
}

impl FromStr for HostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" => Ok(Self::Yes),
            "no" | "false" => Ok(Self::No),
            "accept-new" | "tofu" => Ok(Self::AcceptNew),
            other => Err(format!("unknown host key checking mode '{other}'")),
        }
    }
}

impl fmt::Display for HostKeyChecking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::AcceptNew => "accept-new",
        })
    }
}

/// Decide whether to trust `key` for `host:port` under `mode`, using
/// `~/.ssh/known_hosts`.
pub fn verify_host_key(host: &str, port: u16, key: &PublicKey, mode: HostKeyChecking) -> bool {
    if mode == HostKeyChecking::No {
        tracing::debug!("Host key checking disabled for {}", host);
        return true;
    }
    let Some(path) = BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
    else {
        tracing::error!("Cannot locate known_hosts without a home directory");
        return false;
    };
    verify_host_key_at(&path, host, port, key, mode)
}

/// Same as [`verify_host_key`] against an explicit known_hosts file.
pub fn verify_host_key_at(
    path: &Path,
    host: &str,
    port: u16,
    key: &PublicKey,
    mode: HostKeyChecking,
) -> bool {
    if mode == HostKeyChecking::No {
        return true;
    }

    let known = if path.exists() {
        known_hosts::check_known_hosts_path(host, port, key, path)
    } else {
        Ok(false)
    };
    match known {
        Ok(true) => {
            tracing::debug!("Host key for {} found in known_hosts", host);
            true
        }
        Ok(false) if mode == HostKeyChecking::AcceptNew => {
            if let Err(e) = known_hosts::learn_known_hosts_path(host, port, key, path) {
                tracing::warn!("Could not record host key for {}: {}", host, e);
            } else {
                eprintln!("Warning: Permanently added '{host}' to the list of known hosts.");
            }
            true
        }
        Ok(false) => {
            tracing::error!("No host key is known for {} and strict checking is on", host);
            eprintln!("Host key verification failed: {host} is not in known_hosts");
            false
        }
        Err(russh::keys::Error::KeyChanged { line }) => {
            tracing::error!("Host key for {} changed (known_hosts line {})", host, line);
            eprintln!(
                "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED for {host} (known_hosts line {line})"
            );
            false
        }
        Err(e) => {
            tracing::error!("Failed to check known_hosts for {}: {}", host, e);
            false
        }
    }
}
