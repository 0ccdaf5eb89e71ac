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

//! Second login session that holds the login node to compute node forward.

use std::time::Duration;

use super::banner;
use crate::error::{Error, Result};
use crate::secret::SecretStore;
use crate::session::{OutputFilter, PatternSession, PromptPattern, ShellTransport};

/// How long to wait for each leftover prompt while settling the session.
pub const DRAIN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub port: u16,
    /// Compute node to forward to.
    pub node: String,
}

impl TunnelRequest {
    pub fn new(port: u16, node: impl Into<String>) -> Result<Self> {
        let node = node.into();
        let valid = !node.is_empty()
            && !node.starts_with('-')
            && node
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Err(Error::Validation(format!("invalid compute node name '{node}'")));
        }
        Ok(Self { port, node })
    }

    pub fn tunnel_command(&self) -> String {
        format!("ssh -N -L {0}:127.0.0.1:{0} {1}", self.port, self.node)
    }
}

pub struct TunnelEstablisher<'a> {
    request: &'a TunnelRequest,
    secrets: &'a SecretStore,
}

impl<'a> TunnelEstablisher<'a> {
    pub fn new(request: &'a TunnelRequest, secrets: &'a SecretStore) -> Self {
        Self { request, secrets }
    }

    /// Open the forward from the login node to the compute node.
    ///
    /// On return the session only mirrors output; no further commands are
    /// sent to it.
    pub async fn establish<T: ShellTransport>(&self, session: &mut PatternSession<T>) -> Result<()> {
        session.set_unique_prompt().await?;
        let drained = session.drain_prompts(DRAIN_POLL).await?;
        tracing::debug!("Drained {} pending prompt(s) on {}", drained, session.label());

        let command = self.request.tunnel_command();
        banner(format_args!("\n{command}"));
        session.arm(PromptPattern::password());
        session.send(&command).await?;
        session.expect().await?;

        let answer = self.secrets.with_newline()?;
        session.write_raw(&answer).await?;
        drop(answer);
        session.set_output_filter(OutputFilter::Echo);
        tracing::info!(
            "Forwarding port {} to {}",
            self.request.port,
            self.request.node
        );
        Ok(())
    }
}
