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

//! Error taxonomy shared by every stage of the workflow.
//!
//! None of these errors is recoverable within a run. The orchestrator reports
//! them with a one-line diagnostic and exits non-zero after cleanup.

use std::io;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server rejected the credential for every supported method.
    #[error("authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    /// The host could not be resolved through any resolver configuration.
    #[error("could not resolve host '{host}'")]
    Resolution { host: String },

    /// An expected pattern did not appear within the time budget.
    #[error("the timeout was reached while waiting for {step} ({seconds}s)")]
    Timeout { step: String, seconds: u64 },

    /// The acquired credential failed its liveness check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Neither the pinentry agent nor a terminal is available for input.
    #[error("no secure prompt is available: {0}")]
    PromptUnavailable(String),

    /// The prompt was cancelled or has already been closed.
    #[error("the secret prompt was closed")]
    PromptClosed,

    /// The remote end closed the session while output was still expected.
    #[error("remote session closed")]
    SessionClosed,

    /// An operation was attempted in a session mode that does not allow it.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a timeout error for the named step.
    pub fn timeout(step: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            step: step.into(),
            seconds: timeout.as_secs(),
        }
    }

    /// Whether this error is a step timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let err = Error::timeout("password prompt", Duration::from_secs(60));
        assert!(err.is_timeout());
        let msg = err.to_string();
        assert!(msg.contains("the timeout was reached"));
        assert!(msg.contains("password prompt"));
        assert!(msg.contains("60s"));
    }

    #[test]
    fn test_auth_error_does_not_leak_secret() {
        let err = Error::Auth {
            user: "js123".to_string(),
            host: "o2.example.edu".to_string(),
        };
        assert_eq!(err.to_string(), "authentication failed for js123@o2.example.edu");
        assert!(!err.is_timeout());
    }
}
