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

//! Local port forwarding over `direct-tcpip` channels.
//!
//! [`LocalForward`] binds `127.0.0.1:<port>` and, for each accepted
//! connection, opens a channel to `127.0.0.1:<port>` as seen from the login
//! node. [`relay`] pumps bytes between a local stream and an SSH channel and
//! is shared with X11 forwarding.

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::handler::ClientHandler;
use crate::error::{Error, Result};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;
const FORWARD_TARGET_HOST: &str = "127.0.0.1";

/// The remote half of a relayed connection.
#[async_trait]
pub trait ChannelIo: Send {
    async fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Next chunk from the remote side; `None` after EOF or close.
    async fn next_data(&mut self) -> Option<Vec<u8>>;

    /// Send EOF and close.
    async fn finish(&mut self);
}

#[async_trait]
impl ChannelIo for Channel<Msg> {
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.data(data).await?;
        Ok(())
    }

    async fn next_data(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.wait().await {
                Some(ChannelMsg::Data { data }) => return Some(data.to_vec()),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return None,
                Some(other) => trace!("Ignoring SSH channel message: {:?}", other),
            }
        }
    }

    async fn finish(&mut self) {
        if let Err(e) = self.eof().await {
            trace!("Failed to send EOF to SSH channel: {}", e);
        }
        if let Err(e) = self.close().await {
            trace!("Failed to close SSH channel: {}", e);
        }
    }
}

/// Opens `direct-tcpip` channels to `127.0.0.1:<port>` on the remote side.
#[async_trait]
pub trait DirectTcpip: Send + Sync + 'static {
    type Channel: ChannelIo + 'static;

    async fn open_direct_tcpip(
        &self,
        remote_port: u16,
        peer: SocketAddr,
    ) -> Result<Self::Channel>;
}

#[async_trait]
impl DirectTcpip for Handle<ClientHandler> {
    type Channel = Channel<Msg>;

    async fn open_direct_tcpip(
        &self,
        remote_port: u16,
        peer: SocketAddr,
    ) -> Result<Channel<Msg>> {
        let channel = self
            .channel_open_direct_tcpip(
                FORWARD_TARGET_HOST,
                u32::from(remote_port),
                peer.ip().to_string(),
                u32::from(peer.port()),
            )
            .await?;
        Ok(channel)
    }
}

/// Byte counts for one relayed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub local_to_remote: u64,
    pub remote_to_local: u64,
}

/// Pump bytes between `stream` and `channel` until either side closes or
/// `cancel` fires.
pub async fn relay<S, C>(
    mut stream: S,
    mut channel: C,
    cancel: CancellationToken,
) -> Result<RelayStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: ChannelIo,
{
    let mut stats = RelayStats::default();
    let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];

    let outcome = loop {
        tokio::select! {
            result = stream.read(&mut buffer) => {
                match result {
                    Ok(0) => {
                        trace!("Local socket closed, ending relay");
                        break Ok(());
                    }
                    Ok(n) => {
                        if let Err(e) = channel.send_data(&buffer[..n]).await {
                            break Err(e);
                        }
                        stats.local_to_remote += n as u64;
                    }
                    Err(e) if matches!(
                        e.kind(),
                        std::io::ErrorKind::ConnectionAborted | std::io::ErrorKind::ConnectionReset
                    ) => {
                        trace!("Local connection closed: {}", e);
                        break Ok(());
                    }
                    Err(e) => break Err(e.into()),
                }
            }
            data = channel.next_data() => {
                let Some(data) = data else {
                    trace!("SSH channel ended");
                    break Ok(());
                };
                match stream.write_all(&data).await {
                    Ok(()) => stats.remote_to_local += data.len() as u64,
                    Err(e) if matches!(
                        e.kind(),
                        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionAborted
                    ) => {
                        trace!("Local connection closed: {}", e);
                        break Ok(());
                    }
                    Err(e) => break Err(e.into()),
                }
            }
            _ = cancel.cancelled() => {
                trace!("Relay cancelled");
                break Ok(());
            }
        }
    };

    channel.finish().await;
    if let Err(e) = stream.shutdown().await {
        trace!("Failed to shut down local stream: {}", e);
    }
    debug!(
        "Relay completed: {} bytes out, {} bytes in",
        stats.local_to_remote, stats.remote_to_local
    );
    outcome.map(|()| stats)
}

/// A running `-L port:127.0.0.1:port` style forward.
#[derive(Debug)]
pub struct LocalForward {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl LocalForward {
    /// Bind the local listener and start accepting in the background.
    pub async fn start<O: DirectTcpip>(
        opener: Arc<O>,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind((FORWARD_TARGET_HOST, port))
            .await
            .map_err(|e| {
                Error::Config(format!("cannot bind local port {port} for forwarding: {e}"))
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Local forwarding listening on {}", local_addr);

        let loop_cancel = cancel.clone();
        tokio::spawn(async move {
            accept_loop(listener, opener, port, loop_cancel).await;
        });

        Ok(Self { local_addr, cancel })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LocalForward {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop<O: DirectTcpip>(
    listener: TcpListener,
    opener: Arc<O>,
    remote_port: u16,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        trace!("Accepted connection from {}", peer);
                        tokio::spawn(forward_connection(
                            stream,
                            peer,
                            Arc::clone(&opener),
                            remote_port,
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("Local forwarding on port {} stopped", remote_port);
                break;
            }
        }
    }
}

async fn forward_connection<O: DirectTcpip>(
    stream: TcpStream,
    peer: SocketAddr,
    opener: Arc<O>,
    remote_port: u16,
    cancel: CancellationToken,
) {
    let channel = match opener.open_direct_tcpip(remote_port, peer).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Failed to open forwarding channel for {}: {}", peer, e);
            return;
        }
    };
    if let Err(e) = relay(stream, channel, cancel).await {
        warn!("Forwarded connection from {} failed: {}", peer, e);
    }
}
