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

//! The credential buffer and its scrubbing contract.

use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// Outcome of a best-effort scrub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubReport {
    /// Every byte of the buffer was overwritten and verified.
    Scrubbed,
    /// There was nothing left to scrub.
    AlreadyScrubbed,
    /// The overwrite could not be verified; the bytes may still be readable.
    Incomplete,
}

impl ScrubReport {
    pub fn is_clean(self) -> bool {
        !matches!(self, Self::Incomplete)
    }
}

/// A sensitive byte string held for the duration of the login handshakes.
///
/// The buffer is owned exclusively and is not `Clone`. Callers borrow it
/// through [`Credential::expose`] or take short-lived zeroizing copies for
/// APIs that need owned data across an await point.
pub struct Credential {
    buf: Vec<u8>,
    scrubbed: bool,
}

impl Credential {
    /// Wrap a secret, rejecting empty input.
    ///
    /// The source string is zeroized after its bytes are moved in.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Validation("password cannot be empty".to_string()));
        }
        Ok(Self {
            buf: secret.into_bytes(),
            scrubbed: false,
        })
    }

    /// Borrow the secret bytes.
    pub fn expose(&self) -> Result<&[u8]> {
        if self.scrubbed {
            return Err(Error::Validation("credential already scrubbed".to_string()));
        }
        Ok(&self.buf)
    }

    /// Copy of the secret followed by a newline, as typed at a password prompt.
    pub fn with_newline(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(self.buf.len() + 1));
        bytes.extend_from_slice(self.expose()?);
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Copy of the secret as a string for SSH password authentication.
    pub fn to_password(&self) -> Result<Zeroizing<String>> {
        let text = std::str::from_utf8(self.expose()?)
            .map_err(|_| Error::Validation("password is not valid UTF-8".to_string()))?;
        Ok(Zeroizing::new(text.to_string()))
    }

    pub fn len(&self) -> usize {
        if self.scrubbed {
            0
        } else {
            self.buf.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scrubbed(&self) -> bool {
        self.scrubbed
    }

    /// Overwrite the buffer in place and verify the result.
    ///
    /// The length is kept so the storage can be inspected afterwards.
    pub fn scrub(&mut self) -> ScrubReport {
        if self.scrubbed {
            return ScrubReport::AlreadyScrubbed;
        }
        self.buf.as_mut_slice().zeroize();
        self.scrubbed = true;
        if self.buf.iter().all(|b| *b == 0) {
            ScrubReport::Scrubbed
        } else {
            ScrubReport::Incomplete
        }
    }

    #[cfg(test)]
    pub(crate) fn storage(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"[REDACTED]")
            .field("scrubbed", &self.scrubbed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_credential_rejected() {
        let err = Credential::new(String::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_with_newline() {
        let cred = Credential::new("hunter2".to_string()).unwrap();
        assert_eq!(&*cred.with_newline().unwrap(), b"hunter2\n");
        assert_eq!(&*cred.to_password().unwrap(), "hunter2");
        assert_eq!(cred.len(), 7);
    }

    #[test]
    fn test_scrub_overwrites_storage() {
        let mut cred = Credential::new("hunter2".to_string()).unwrap();
        assert_eq!(cred.storage(), b"hunter2");

        assert_eq!(cred.scrub(), ScrubReport::Scrubbed);
        assert_eq!(cred.storage().len(), 7);
        assert_ne!(cred.storage(), b"hunter2");
        assert!(cred.storage().iter().all(|b| *b == 0));
        assert!(cred.is_scrubbed());
        assert!(cred.is_empty());
    }

    #[test]
    fn test_scrub_is_idempotent_and_blocks_access() {
        let mut cred = Credential::new("hunter2".to_string()).unwrap();
        assert!(cred.scrub().is_clean());
        assert_eq!(cred.scrub(), ScrubReport::AlreadyScrubbed);
        assert!(cred.expose().is_err());
        assert!(cred.with_newline().is_err());
    }

    #[test]
    fn test_debug_redaction() {
        let cred = Credential::new("hunter2".to_string()).unwrap();
        let debug = format!("{cred:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
