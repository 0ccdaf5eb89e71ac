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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::utils::{default_pinentry_path, expand_tilde};
use crate::ssh::HostKeyChecking;

pub const DEFAULT_HOST: &str = "o2.hms.harvard.edu";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_PORT: u16 = 8887;
pub const DEFAULT_TIME: &str = "0-3:00";
pub const DEFAULT_MEM: &str = "1G";
pub const DEFAULT_CORES: u32 = 1;
pub const DEFAULT_PARTITION: &str = "interactive";
pub const DEFAULT_SOURCE_JUPYTER_CALL: &str = "py35";
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TUNNEL_TIMEOUT_SECS: u64 = 10;

/// Nameserver groups that carry entries for the individual login nodes,
/// tried in order after the system resolver.
pub fn default_dns_server_groups() -> Vec<Vec<IpAddr>> {
    let group = |servers: &[[u8; 4]]| servers.iter().map(|ip| IpAddr::from(*ip)).collect();
    vec![
        group(&[[134, 174, 17, 6], [134, 174, 141, 2]]),
        group(&[[128, 103, 1, 1], [128, 103, 201, 100], [128, 103, 200, 101]]),
    ]
}

/// Contents of the YAML configuration file. Every key is optional.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub ssh_port: Option<u16>,
    pub port: Option<u16>,
    pub time: Option<String>,
    pub mem: Option<String>,
    pub cores: Option<u32>,
    pub partition: Option<String>,
    pub x11: Option<bool>,
    /// Shell command that enters the Jupyter environment. One line; use
    /// semicolons to chain several commands.
    pub source_jupyter_call: Option<String>,
    pub pinentry_path: Option<PathBuf>,
    pub dns_server_groups: Option<Vec<Vec<IpAddr>>>,
    pub login_timeout_secs: Option<u64>,
    pub tunnel_timeout_secs: Option<u64>,
    pub open_browser: Option<bool>,
    pub host_key_checking: Option<HostKeyChecking>,
}

/// Values given on the command line, overriding the file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub time: Option<String>,
    pub mem: Option<String>,
    pub cores: Option<u32>,
    pub keepalive: bool,
    pub no_browser: bool,
    pub no_x11: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub user: String,
    pub subcommand: String,
    pub host: String,
    pub ssh_port: u16,
    pub port: u16,
    pub time: String,
    pub mem: String,
    pub cores: u32,
    pub partition: String,
    pub x11: bool,
    pub keepalive: bool,
    pub source_jupyter_call: String,
    pub pinentry_path: PathBuf,
    pub dns_server_groups: Vec<Vec<IpAddr>>,
    pub login_timeout: Duration,
    pub tunnel_timeout: Duration,
    pub open_browser: bool,
    pub host_key_checking: HostKeyChecking,
}

impl Settings {
    /// Merge with precedence: command line, then file, then built-in default.
    pub fn resolve(
        user: impl Into<String>,
        subcommand: impl Into<String>,
        file: Config,
        cli: Overrides,
    ) -> Self {
        Self {
            user: user.into(),
            subcommand: subcommand.into(),
            host: cli.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            ssh_port: file.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            time: cli.time.or(file.time).unwrap_or_else(|| DEFAULT_TIME.to_string()),
            mem: cli.mem.or(file.mem).unwrap_or_else(|| DEFAULT_MEM.to_string()),
            cores: cli.cores.or(file.cores).unwrap_or(DEFAULT_CORES),
            partition: file
                .partition
                .unwrap_or_else(|| DEFAULT_PARTITION.to_string()),
            x11: !cli.no_x11 && file.x11.unwrap_or(true),
            keepalive: cli.keepalive,
            source_jupyter_call: file
                .source_jupyter_call
                .unwrap_or_else(|| DEFAULT_SOURCE_JUPYTER_CALL.to_string()),
            pinentry_path: file
                .pinentry_path
                .map(|p| expand_tilde(&p))
                .unwrap_or_else(default_pinentry_path),
            dns_server_groups: file
                .dns_server_groups
                .unwrap_or_else(default_dns_server_groups),
            login_timeout: Duration::from_secs(
                file.login_timeout_secs.unwrap_or(DEFAULT_LOGIN_TIMEOUT_SECS),
            ),
            tunnel_timeout: Duration::from_secs(
                file.tunnel_timeout_secs
                    .unwrap_or(DEFAULT_TUNNEL_TIMEOUT_SECS),
            ),
            open_browser: !cli.no_browser && file.open_browser.unwrap_or(true),
            host_key_checking: file.host_key_checking.unwrap_or_default(),
        }
    }
}
