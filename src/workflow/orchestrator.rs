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

//! End-to-end run: resolve, allocate, launch, tunnel, then hand over the
//! terminal.

use async_trait::async_trait;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::allocation::{Allocation, AllocationNegotiator, AllocationRequest};
use super::cleanup::CleanupContext;
use super::launcher::{ServiceLauncher, ServiceRequest};
use super::tunnel::{TunnelEstablisher, TunnelRequest};
use super::{banner, browser};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::resolver::{HostResolver, Resolution};
use crate::secret::SecretStore;
use crate::session::pattern::{LOGOUT_TRIGGER, SENTINEL_TRIGGER};
use crate::session::{InteractOutcome, PatternSession, ShellTransport};
use crate::ssh::{ConnectOptions, SshShell};

pub const PRIMARY_LABEL: &str = "login_ssh";
pub const TUNNEL_LABEL: &str = "second_ssh";

/// Opens authenticated shell transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: ShellTransport + 'static;

    async fn connect(
        &self,
        options: &ConnectOptions,
        secrets: &SecretStore,
    ) -> Result<Self::Transport>;
}

/// Connects over SSH with russh.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshShell;

    async fn connect(&self, options: &ConnectOptions, secrets: &SecretStore) -> Result<SshShell> {
        SshShell::connect(options, secrets).await
    }
}

/// State after every scripted step succeeded.
pub struct PreparedRun<T: ShellTransport> {
    pub primary: PatternSession<T>,
    pub url: String,
    pub allocation: Allocation,
    /// Mirrors the tunnel session's output until it closes.
    pub tunnel: JoinHandle<()>,
}

/// How a completed run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub url: String,
    pub allocation: Allocation,
    pub interact: InteractOutcome,
}

pub struct SessionOrchestrator<C: Connector> {
    settings: Settings,
    connector: C,
    resolver: HostResolver,
    cleanup: Arc<CleanupContext>,
}

impl<C: Connector> SessionOrchestrator<C> {
    pub fn new(
        settings: Settings,
        connector: C,
        resolver: HostResolver,
        cleanup: Arc<CleanupContext>,
    ) -> Self {
        Self {
            settings,
            connector,
            resolver,
            cleanup,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every scripted step and return the primary session ready for
    /// passthrough. The credential is scrubbed once the tunnel is up.
    pub async fn prepare(&self) -> Result<PreparedRun<C::Transport>> {
        let settings = &self.settings;
        let secrets = self.cleanup.secrets().as_ref();
        let allocation_request = AllocationRequest::new(
            settings.time.clone(),
            settings.mem.clone(),
            settings.cores,
            settings.partition.clone(),
            settings.x11,
        )?;
        let service_request = ServiceRequest::new(
            settings.subcommand.clone(),
            settings.port,
            settings.source_jupyter_call.clone(),
        )?;

        let login_target = self.resolve_announced(&settings.host, "").await?;
        let mut options = self.connect_options(login_target, settings.login_timeout);
        options.local_forward = Some(settings.port);
        options.x11 = settings.x11;
        let mut primary = self.open_session(&options, PRIMARY_LABEL).await?;

        let allocation = AllocationNegotiator::new(&allocation_request, secrets)
            .negotiate(&mut primary)
            .await?;
        let url = ServiceLauncher::new(&service_request)
            .launch(&mut primary)
            .await?;

        let tunnel_request = TunnelRequest::new(settings.port, allocation.node.clone())?;
        let tunnel_target = self
            .resolve_announced(&allocation.login_host, "\n")
            .await?;
        let options = self.connect_options(tunnel_target, settings.tunnel_timeout);
        let mut tunnel = self.open_session(&options, TUNNEL_LABEL).await?;
        TunnelEstablisher::new(&tunnel_request, secrets)
            .establish(&mut tunnel)
            .await?;
        secrets.dispose();

        let tunnel = tokio::spawn(async move {
            match tunnel.follow().await {
                Ok(()) => tracing::debug!("Tunnel session closed"),
                Err(e) => tracing::warn!("Tunnel session ended: {}", e),
            }
        });

        Ok(PreparedRun {
            primary,
            url,
            allocation,
            tunnel,
        })
    }

    /// Full run: prepare, open the browser and relay the terminal until the
    /// exit trigger shows up.
    pub async fn run(&self) -> Result<SessionOutcome> {
        let PreparedRun {
            mut primary,
            url,
            allocation,
            tunnel,
        } = self.prepare().await?;

        banner(format_args!(
            "\n{}\n{}",
            "Jupyter is ready! Access at:".green().bold(),
            url.underline()
        ));
        if self.settings.open_browser {
            banner(format_args!("Opening in browser..."));
            browser::open(&url);
        }

        let trigger = if self.settings.keepalive {
            LOGOUT_TRIGGER
        } else {
            SENTINEL_TRIGGER
        };
        let interact = primary.interact(trigger).await;
        tunnel.abort();
        Ok(SessionOutcome {
            url,
            allocation,
            interact: interact?,
        })
    }

    /// Print the ssh banner, resolve, and print it again if the target changed.
    async fn resolve_announced(&self, host: &str, lead: &str) -> Result<String> {
        let user = &self.settings.user;
        banner(format_args!("{lead}ssh {user}@{host}"));
        match self.resolver.resolve(host).await {
            Resolution::AsGiven(host) => Ok(host),
            Resolution::ViaFallback(ip) => {
                banner(format_args!("ssh {user}@{ip}"));
                Ok(ip.to_string())
            }
            Resolution::Unresolved => Err(Error::Resolution {
                host: host.to_string(),
            }),
        }
    }

    fn connect_options(&self, host: String, timeout: Duration) -> ConnectOptions {
        let mut options = ConnectOptions::new(host, self.settings.user.clone());
        options.port = self.settings.ssh_port;
        options.handshake_timeout = timeout;
        options.host_key_checking = self.settings.host_key_checking;
        options
    }

    async fn open_session(
        &self,
        options: &ConnectOptions,
        label: &str,
    ) -> Result<PatternSession<C::Transport>> {
        let secrets = self.cleanup.secrets().as_ref();
        let transport = self.connector.connect(options, secrets).await?;
        let session = PatternSession::new(transport, label, options.handshake_timeout);
        self.cleanup.register_session(label, session.closer());
        tracing::info!("Connected {} to {}", label, options.host);
        Ok(session)
    }
}
