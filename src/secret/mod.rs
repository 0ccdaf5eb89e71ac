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

//! Secure acquisition and disposal of the cluster password.
//!
//! This module provides:
//! - [`Credential`]: the password buffer, scrubbed in place on disposal
//! - [`SecretStore`]: the single owner of the live credential for a run
//! - [`SecretPrompt`] backends: pinentry (preferred) and hidden terminal input
//!
//! # Security Considerations
//! - The credential is never logged or printed; `Debug` output is redacted
//! - Copies handed to SSH APIs are `Zeroizing` and short-lived
//! - Disposal overwrites the buffer and reports if that cannot be verified

mod credential;
pub mod pinentry;
pub mod terminal;

pub use credential::{Credential, ScrubReport};
pub use pinentry::{PinentryClient, PinentryProcess};
pub use terminal::TerminalPrompt;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Text shown by the prompt backend.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub prompt: String,
    pub description: Option<String>,
    /// Shown before each retry after the validator rejected the input.
    pub error: String,
}

/// A mechanism for asking the user for a secret.
pub trait SecretPrompt: Send {
    /// Ask until `validator` accepts the input or the mechanism fails.
    fn ask(&mut self, request: &PromptRequest, validator: &dyn Fn(&str) -> bool)
        -> Result<Credential>;

    /// Release the backend. Further `ask` calls fail.
    fn close(&mut self) -> Result<()>;
}

/// Default liveness check: any non-empty input.
pub fn non_empty(secret: &str) -> bool {
    !secret.is_empty()
}

/// Open the best available prompt backend.
///
/// pinentry is used when the binary can be found and answers; otherwise
/// input is read from the terminal with echo disabled.
pub fn open_prompt(pinentry_path: &Path) -> Result<Box<dyn SecretPrompt>> {
    let terminal = || -> Result<Box<dyn SecretPrompt>> { Ok(Box::new(TerminalPrompt::new()?)) };
    if let Some(path) = find_executable(pinentry_path) {
        match PinentryProcess::spawn(&path) {
            Ok(process) => {
                return Ok(Box::new(FallbackPrompt::new(Box::new(process), terminal)));
            }
            Err(e) => tracing::warn!("pinentry unavailable, using terminal input: {}", e),
        }
    } else {
        tracing::debug!(
            "pinentry not found at {}, using terminal input",
            pinentry_path.display()
        );
    }
    terminal()
}

/// A preferred backend that hands over to a lazily opened second one once
/// it reports [`Error::PromptUnavailable`]. A cancelled prompt stays final.
pub struct FallbackPrompt<F>
where
    F: FnMut() -> Result<Box<dyn SecretPrompt>> + Send,
{
    preferred: Option<Box<dyn SecretPrompt>>,
    open_fallback: F,
    fallback: Option<Box<dyn SecretPrompt>>,
}

impl<F> FallbackPrompt<F>
where
    F: FnMut() -> Result<Box<dyn SecretPrompt>> + Send,
{
    pub fn new(preferred: Box<dyn SecretPrompt>, open_fallback: F) -> Self {
        Self {
            preferred: Some(preferred),
            open_fallback,
            fallback: None,
        }
    }
}

impl<F> SecretPrompt for FallbackPrompt<F>
where
    F: FnMut() -> Result<Box<dyn SecretPrompt>> + Send,
{
    fn ask(
        &mut self,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<Credential> {
        if let Some(preferred) = self.preferred.as_mut() {
            match preferred.ask(request, validator) {
                Err(Error::PromptUnavailable(reason)) => {
                    tracing::warn!("{}, using terminal input", reason);
                    if let Some(mut preferred) = self.preferred.take() {
                        if let Err(e) = preferred.close() {
                            tracing::debug!("Failed to close password prompt: {}", e);
                        }
                    }
                }
                outcome => return outcome,
            }
        }

        if self.fallback.is_none() {
            self.fallback = Some((self.open_fallback)()?);
        }
        match self.fallback.as_mut() {
            Some(fallback) => fallback.ask(request, validator),
            None => Err(Error::PromptClosed),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(preferred) = self.preferred.as_mut() {
            preferred.close()?;
        }
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.close()?;
        }
        Ok(())
    }
}

/// Locate an executable by explicit path or by searching `PATH`.
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Owner of the single live credential.
///
/// Shared between the workflow and the cleanup routine. All access goes
/// through short critical sections; nothing holds the lock across an await.
#[derive(Default)]
pub struct SecretStore {
    slot: Mutex<Option<Credential>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask `backend` for the credential and keep it.
    ///
    /// Any previously held credential is scrubbed first so at most one
    /// instance exists.
    pub fn acquire(
        &self,
        backend: &mut dyn SecretPrompt,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<()> {
        let credential = backend.ask(request, validator)?;
        self.insert(credential);
        Ok(())
    }

    /// Store a credential, scrubbing any previous one.
    pub fn insert(&self, credential: Credential) {
        let mut slot = self.slot();
        if let Some(mut old) = slot.take() {
            old.scrub();
        }
        *slot = Some(credential);
    }

    /// Whether an unscrubbed credential is held.
    pub fn is_live(&self) -> bool {
        self.slot().as_ref().is_some_and(|c| !c.is_scrubbed())
    }

    /// Short-lived copy for SSH password authentication.
    pub fn password(&self) -> Result<Zeroizing<String>> {
        self.slot()
            .as_ref()
            .ok_or_else(|| Error::Validation("no credential acquired".to_string()))?
            .to_password()
    }

    /// Short-lived copy of the credential plus newline, typed at a remote prompt.
    pub fn with_newline(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.slot()
            .as_ref()
            .ok_or_else(|| Error::Validation("no credential acquired".to_string()))?
            .with_newline()
    }

    /// Scrub the credential in place.
    ///
    /// Safe to call repeatedly. A scrub that cannot be verified is reported
    /// to the user but does not fail the process.
    pub fn dispose(&self) -> ScrubReport {
        let report = match self.slot().as_mut() {
            Some(credential) => credential.scrub(),
            None => ScrubReport::AlreadyScrubbed,
        };
        match report {
            ScrubReport::Scrubbed => tracing::debug!("Credential scrubbed"),
            ScrubReport::AlreadyScrubbed => {}
            ScrubReport::Incomplete => {
                tracing::warn!("Credential scrub could not be verified");
                eprintln!("Warning: the password could not be securely erased from memory");
            }
        }
        report
    }

    #[cfg(test)]
    pub(crate) fn storage_snapshot(&self) -> Option<Vec<u8>> {
        self.slot().as_ref().map(|c| c.storage().to_vec())
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("live", &self.is_live())
            .finish()
    }
}
