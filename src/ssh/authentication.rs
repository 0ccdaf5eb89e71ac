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

//! Password-only authentication.
//!
//! Public keys are never offered so the login always goes through the
//! credential the user typed. Servers that only allow keyboard-interactive
//! get the same credential for every prompt that asks for a password.

use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};

use crate::error::{Error, Result};
use crate::secret::SecretStore;

/// Upper bound on keyboard-interactive rounds before giving up.
const MAX_INTERACTIVE_ROUNDS: usize = 5;

pub(super) async fn authenticate<H>(
    handle: &mut Handle<H>,
    username: &str,
    host: &str,
    secrets: &SecretStore,
) -> Result<()>
where
    H: Handler<Error = Error>,
{
    let password = secrets.password()?;
    let result = handle
        .authenticate_password(username, password.as_str())
        .await?;
    if result.success() {
        tracing::debug!("Password authentication succeeded for {}@{}", username, host);
        return Ok(());
    }

    tracing::debug!("Password method rejected, trying keyboard-interactive");
    let mut response = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await?;
    for _ in 0..MAX_INTERACTIVE_ROUNDS {
        let prompts = match response {
            KeyboardInteractiveAuthResponse::Success => {
                tracing::debug!(
                    "Keyboard-interactive authentication succeeded for {}@{}",
                    username,
                    host
                );
                return Ok(());
            }
            KeyboardInteractiveAuthResponse::Failure { .. } => break,
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => prompts,
        };

        let answers = answer_prompts(prompts.iter().map(|p| p.prompt.as_str()), &password);
        response = handle
            .authenticate_keyboard_interactive_respond(answers)
            .await?;
    }

    Err(Error::Auth {
        user: username.to_string(),
        host: host.to_string(),
    })
}

/// Answer each keyboard-interactive prompt: the password where one is asked
/// for, an empty string otherwise.
fn answer_prompts<'a>(prompts: impl IntoIterator<Item = &'a str>, password: &str) -> Vec<String> {
    prompts
        .into_iter()
        .map(|prompt| {
            if prompt.to_lowercase().contains("password") {
                password.to_string()
            } else {
                tracing::debug!("Answering unrecognized prompt with an empty response");
                String::new()
            }
        })
        .collect()
}
