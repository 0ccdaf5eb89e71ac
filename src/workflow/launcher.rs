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

//! Start the Jupyter server on the compute node and capture its URL.

use crate::error::{Error, Result};
use crate::session::{OutputFilter, PatternSession, PromptPattern, ShellTransport};

/// What to run on the compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Jupyter subcommand, e.g. `notebook` or `lab`.
    pub subcommand: String,
    pub port: u16,
    /// Shell line that activates the environment Jupyter lives in.
    pub activation: String,
}

impl ServiceRequest {
    pub fn new(
        subcommand: impl Into<String>,
        port: u16,
        activation: impl Into<String>,
    ) -> Result<Self> {
        let request = Self {
            subcommand: subcommand.into(),
            port,
            activation: activation.into(),
        };
        let valid = !request.subcommand.is_empty()
            && request
                .subcommand
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Validation(format!(
                "invalid jupyter subcommand '{}'",
                request.subcommand
            )));
        }
        if request.port == 0 {
            return Err(Error::Validation("port must be non-zero".to_string()));
        }
        if request.activation.contains('\n') {
            return Err(Error::Validation(
                "the environment activation command must be a single line".to_string(),
            ));
        }
        Ok(request)
    }

    pub fn service_command(&self) -> String {
        format!(
            "jupyter {} --port={} --browser='none'",
            self.subcommand, self.port
        )
    }
}

/// Runs the activation line and the service on the negotiated session.
pub struct ServiceLauncher<'a> {
    request: &'a ServiceRequest,
}

impl<'a> ServiceLauncher<'a> {
    pub fn new(request: &'a ServiceRequest) -> Self {
        Self { request }
    }

    /// Start the service and return the access URL it reports.
    ///
    /// The session must be sitting at the sentinel prompt. From the moment
    /// the service starts, its output is mirrored to the user.
    pub async fn launch<T: ShellTransport>(&self, session: &mut PatternSession<T>) -> Result<String> {
        session.arm(PromptPattern::sentinel());
        if !self.request.activation.trim().is_empty() {
            session.send(&self.request.activation).await?;
            session.expect().await?;
        }

        session.send(&self.request.service_command()).await?;
        session.set_output_filter(OutputFilter::Echo);
        session.arm(PromptPattern::service_url(self.request.port));
        let found = session.expect().await?;

        let url = match found.capture {
            Some(ref capture) => String::from_utf8_lossy(capture).into_owned(),
            None => String::from_utf8_lossy(&found.matched).trim().to_string(),
        };
        tracing::info!("Jupyter reported {}", url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_command() {
        let request = ServiceRequest::new("lab", 8887, "source activate py35").unwrap();
        assert_eq!(
            request.service_command(),
            "jupyter lab --port=8887 --browser='none'"
        );
    }

    #[test]
    fn test_rejects_bad_subcommand() {
        assert!(ServiceRequest::new("", 8887, "").is_err());
        assert!(ServiceRequest::new("notebook; reboot", 8887, "").is_err());
        assert!(ServiceRequest::new("notebook", 0, "").is_err());
        assert!(ServiceRequest::new("notebook", 8887, "a\nb").is_err());
    }
}
