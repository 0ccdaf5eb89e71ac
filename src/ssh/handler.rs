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

use russh::client::{Handler, Msg, Session};
use russh::Channel;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::known_hosts::{verify_host_key, HostKeyChecking};
use super::x11::X11Display;
use crate::error::Error;

/// SSH client handler: host key verification and X11 channel bridging.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    host_key_checking: HostKeyChecking,
    x11: Option<Arc<X11Display>>,
    cancel: CancellationToken,
}

impl ClientHandler {
    pub fn new(
        hostname: String,
        port: u16,
        host_key_checking: HostKeyChecking,
        x11: Option<Arc<X11Display>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hostname,
            port,
            host_key_checking,
            x11,
            cancel,
        }
    }
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(verify_host_key(
            &self.hostname,
            self.port,
            server_public_key,
            self.host_key_checking,
        ))
    }

    async fn server_channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(display) = self.x11.clone() else {
            tracing::warn!("Ignoring unexpected X11 channel from the server");
            return Ok(());
        };
        tracing::debug!(
            "X11 channel opened for {}:{}",
            originator_address,
            originator_port
        );
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = display.bridge(channel, cancel).await {
                let name = &display.display;
                tracing::warn!("X11 forwarding to {} failed: {}", name, e);
            }
        });
        Ok(())
    }
}
