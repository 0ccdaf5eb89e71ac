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

//! Hidden-input terminal prompt used when pinentry is not installed.

use std::io::IsTerminal;
use zeroize::Zeroizing;

use super::{Credential, PromptRequest, SecretPrompt};
use crate::error::{Error, Result};

/// Reads the secret from the controlling terminal without echo.
#[derive(Debug, Default)]
pub struct TerminalPrompt {
    closed: bool,
}

impl TerminalPrompt {
    /// Create a terminal prompt, failing when stdout is not a terminal.
    pub fn new() -> Result<Self> {
        if !std::io::stdout().is_terminal() {
            return Err(Error::PromptUnavailable(
                "pinentry is not installed and stdout is not a terminal".to_string(),
            ));
        }
        Ok(Self::default())
    }
}

impl SecretPrompt for TerminalPrompt {
    fn ask(
        &mut self,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<Credential> {
        if self.closed {
            return Err(Error::PromptClosed);
        }
        if let Some(description) = &request.description {
            println!("{description}");
        }

        let mut first = true;
        loop {
            if !first {
                eprintln!("{}", request.error);
            }
            first = false;

            let password = Zeroizing::new(
                rpassword::prompt_password(&request.prompt)
                    .map_err(|e| Error::PromptUnavailable(format!("failed to read password: {e}")))?,
            );
            if validator(&password) {
                return Credential::new(password.to_string());
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
