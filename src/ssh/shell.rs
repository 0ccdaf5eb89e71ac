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

//! Interactive shell channel over an authenticated SSH connection.

use async_trait::async_trait;
use russh::client::{Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::authentication::authenticate;
use super::forward::LocalForward;
use super::handler::ClientHandler;
use super::known_hosts::HostKeyChecking;
use super::x11::X11Display;
use crate::error::{Error, Result};
use crate::secret::SecretStore;
use crate::session::{ShellTransport, TransportCloser};

const DEFAULT_TERM: &str = "xterm-256color";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection parameters for one shell session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Hostname or address to connect to.
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Bound on TCP connect, key exchange and authentication together.
    pub handshake_timeout: Duration,
    pub host_key_checking: HostKeyChecking,
    /// Forward `127.0.0.1:<port>` locally to the same port on the login node.
    pub local_forward: Option<u16>,
    /// Request X11 forwarding on the shell channel.
    pub x11: bool,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            handshake_timeout: Duration::from_secs(60),
            host_key_checking: HostKeyChecking::default(),
            local_forward: None,
            x11: false,
        }
    }
}

/// Tears a connection down from outside the owning task.
pub struct SshCloser {
    handle: Arc<Handle<ClientHandler>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

#[async_trait]
impl TransportCloser for SshCloser {
    async fn force_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let disconnect = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "");
        match tokio::time::timeout(FORCE_CLOSE_TIMEOUT, disconnect).await {
            Ok(Ok(())) => tracing::debug!("Disconnected"),
            Ok(Err(e)) => tracing::debug!("Disconnect failed: {}", e),
            Err(_) => tracing::debug!("Disconnect timed out"),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.handle.is_closed()
    }
}

/// A PTY-backed login shell.
pub struct SshShell {
    channel: Channel<Msg>,
    closer: Arc<SshCloser>,
    forward: Option<LocalForward>,
}

impl SshShell {
    /// Connect, authenticate with the stored credential and start a shell.
    pub async fn connect(options: &ConnectOptions, secrets: &SecretStore) -> Result<Self> {
        let cancel = CancellationToken::new();
        let x11 = if options.x11 {
            match X11Display::from_env().await {
                Ok(display) => Some(Arc::new(display)),
                Err(e) => {
                    tracing::warn!("X11 forwarding disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let config = Arc::new(Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });
        let handler = ClientHandler::new(
            options.host.clone(),
            options.port,
            options.host_key_checking,
            x11.clone(),
            cancel.clone(),
        );

        let handshake = async {
            let mut handle =
                russh::client::connect(config, (options.host.as_str(), options.port), handler)
                    .await?;
            authenticate(&mut handle, &options.user, &options.host, secrets).await?;
            Ok::<_, Error>(handle)
        };
        let handle = match tokio::time::timeout(options.handshake_timeout, handshake).await {
            Ok(handle) => Arc::new(handle?),
            Err(_) => {
                return Err(Error::timeout(
                    format!("the SSH login to {}", options.host),
                    options.handshake_timeout,
                ))
            }
        };

        let channel = handle.channel_open_session().await?;
        if let Some(display) = &x11 {
            channel
                .request_x11(
                    false,
                    false,
                    display.auth_protocol.as_str(),
                    display.auth_cookie.as_str(),
                    display.screen,
                )
                .await?;
            let name = &display.display;
            tracing::debug!("Requested X11 forwarding for {}", name);
        }

        let (cols, rows) = crate::pty::terminal_size().unwrap_or((80, 24));
        let term = std::env::var("TERM").unwrap_or_else(|_| DEFAULT_TERM.to_string());
        channel
            .request_pty(false, &term, u32::from(cols), u32::from(rows), 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;

        let forward = match options.local_forward {
            Some(port) => Some(LocalForward::start(handle.clone(), port, cancel.clone()).await?),
            None => None,
        };

        Ok(Self {
            channel,
            closer: Arc::new(SshCloser {
                handle,
                cancel,
                closed: AtomicBool::new(false),
            }),
            forward,
        })
    }
}

impl fmt::Debug for SshShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshShell")
            .field("channel", &self.channel.id())
            .field("forward", &self.forward)
            .finish()
    }
}

#[async_trait]
impl ShellTransport for SshShell {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    return Ok(Some(data.to_vec()))
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("Remote shell exited with status {}", exit_status);
                }
                Some(other) => tracing::trace!("Ignoring channel message: {:?}", other),
            }
        }
    }

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.channel
            .window_change(u32::from(cols), u32::from(rows), 0, 0)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(forward) = &self.forward {
            forward.stop();
        }
        if let Err(e) = self.channel.eof().await {
            tracing::trace!("Failed to send EOF: {}", e);
        }
        if let Err(e) = self.channel.close().await {
            tracing::trace!("Failed to close channel: {}", e);
        }
        self.closer.force_close().await;
        Ok(())
    }

    fn closer(&self) -> Arc<dyn TransportCloser> {
        self.closer.clone()
    }
}
