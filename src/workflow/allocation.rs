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

//! Interactive node allocation through the Slurm scheduler.
//!
//! The negotiation runs on the primary session right after login:
//!
//! 1. switch to the sentinel prompt and ask the login shell for its hostname
//! 2. send `srun ... --pty /bin/bash` and wait for the compute node's
//!    password prompt
//! 3. answer with the credential, then switch the new shell to the sentinel
//!    prompt and read the bare compute node name
//!
//! A timeout at any step aborts the run; nothing is retried because the
//! remote shell state would no longer line up with the expected patterns.

use owo_colors::OwoColorize;

use super::banner;
use crate::error::{Error, Result};
use crate::secret::SecretStore;
use crate::session::{OutputFilter, PatternSession, PromptPattern, ShellTransport};

/// Prints the login shell's hostname.
pub const IDENTITY_COMMAND: &str = "echo $HOSTNAME";

/// Prints the compute node's short hostname.
pub const NODE_NAME_COMMAND: &str = r"hostname | sed 's/\..*//'";

/// Resources requested from the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub time: String,
    pub mem: String,
    pub cores: u32,
    pub partition: String,
    pub x11: bool,
}

impl AllocationRequest {
    /// Build a request, rejecting values that would not survive being
    /// spliced into a shell command line.
    pub fn new(
        time: impl Into<String>,
        mem: impl Into<String>,
        cores: u32,
        partition: impl Into<String>,
        x11: bool,
    ) -> Result<Self> {
        let request = Self {
            time: time.into(),
            mem: mem.into(),
            cores,
            partition: partition.into(),
            x11,
        };
        validate_token("time", &request.time)?;
        validate_token("mem", &request.mem)?;
        validate_token("partition", &request.partition)?;
        if request.cores == 0 {
            return Err(Error::Validation("cores must be at least 1".to_string()));
        }
        Ok(request)
    }

    /// The `srun` invocation that opens an interactive shell on a compute node.
    pub fn scheduler_command(&self) -> String {
        let mut command = format!(
            "srun -t {} --mem {} -n {} --pty -p {}",
            self.time, self.mem, self.cores, self.partition
        );
        if self.x11 {
            command.push_str(" --x11");
        }
        command.push_str(" /bin/bash");
        command
    }
}

fn validate_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.' | '_');
    if let Some(bad) = value.chars().find(|c| !allowed(*c)) {
        return Err(Error::Validation(format!(
            "{field} contains an unsupported character {bad:?}"
        )));
    }
    Ok(())
}

/// Where the scheduler placed the interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Hostname of the login node the primary session landed on.
    pub login_host: String,
    /// Short name of the compute node.
    pub node: String,
}

/// Drives the allocation sequence on an authenticated session.
pub struct AllocationNegotiator<'a> {
    request: &'a AllocationRequest,
    secrets: &'a SecretStore,
}

impl<'a> AllocationNegotiator<'a> {
    pub fn new(request: &'a AllocationRequest, secrets: &'a SecretStore) -> Self {
        Self { request, secrets }
    }

    pub async fn negotiate<T: ShellTransport>(
        &self,
        session: &mut PatternSession<T>,
    ) -> Result<Allocation> {
        session.set_unique_prompt().await?;

        session.send(IDENTITY_COMMAND).await?;
        let identity = session.expect().await?;
        let login_host = identity.command_output_line().ok_or_else(|| {
            Error::InvalidState("login node did not report its hostname".to_string())
        })?;
        banner(format_args!("hostname: {}", login_host.bold()));
        banner(format_args!(""));

        session.arm(PromptPattern::password());
        session.set_output_filter(OutputFilter::starts_with("srun"));
        let command = self.request.scheduler_command();
        tracing::info!("Requesting interactive allocation: {}", command);
        session.send(&command).await?;
        session.expect().await?;

        session.set_output_filter(OutputFilter::Silent);
        let answer = self.secrets.with_newline()?;
        session.write_raw(&answer).await?;
        drop(answer);

        session.set_unique_prompt().await?;
        session.send(NODE_NAME_COMMAND).await?;
        let reply = session.expect().await?;
        let node = reply.command_output_line().ok_or_else(|| {
            Error::InvalidState("compute node did not report its hostname".to_string())
        })?;
        banner(format_args!("interactive host: {}\n", node.bold()));
        tracing::info!("Allocated compute node {} via {}", node, login_host);

        Ok(Allocation { login_host, node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_command_template() {
        let request = AllocationRequest::new("0-3:00", "1G", 1, "interactive", true).unwrap();
        assert_eq!(
            request.scheduler_command(),
            "srun -t 0-3:00 --mem 1G -n 1 --pty -p interactive --x11 /bin/bash"
        );
    }

    #[test]
    fn test_scheduler_command_without_x11() {
        let request = AllocationRequest::new("1-00:00", "16G", 8, "short", false).unwrap();
        assert_eq!(
            request.scheduler_command(),
            "srun -t 1-00:00 --mem 16G -n 8 --pty -p short /bin/bash"
        );
    }

    #[test]
    fn test_values_land_in_their_positions() {
        for (time, mem, cores) in [("0-0:30", "500M", 2), ("2-12:00", "64G", 32), ("15", "2.5G", 1)] {
            let request = AllocationRequest::new(time, mem, cores, "interactive", false).unwrap();
            let command = request.scheduler_command();
            let words: Vec<&str> = command.split(' ').collect();
            assert_eq!(words[2], time);
            assert_eq!(words[4], mem);
            assert_eq!(words[6], cores.to_string());
        }
    }

    #[test]
    fn test_rejects_unsafe_values() {
        assert!(AllocationRequest::new("", "1G", 1, "interactive", true).is_err());
        assert!(AllocationRequest::new("0-3:00", "1G; rm -rf ~", 1, "interactive", true).is_err());
        assert!(AllocationRequest::new("0-3:00", "1G", 0, "interactive", true).is_err());
        assert!(AllocationRequest::new("0-3:00", "1G", 1, "a b", true).is_err());
    }
}
