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

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;

use jupyter_o2::{
    cli::Cli,
    config::{Config, Settings},
    resolver::HostResolver,
    secret::{non_empty, open_prompt, PromptRequest, SecretStore},
    utils::init_logging,
    workflow::{CleanupContext, SessionOrchestrator, SessionOutcome, SshConnector},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = Config::load_with_priority(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    let settings = Settings::resolve(
        cli.user.clone(),
        cli.subcommand.clone(),
        file,
        cli.overrides(),
    );
    tracing::debug!("Resolved settings: {:?}", settings);

    let secrets = Arc::new(SecretStore::new());
    let cleanup = CleanupContext::new(Arc::clone(&secrets));
    cleanup
        .install_signal_handlers()
        .context("Failed to install signal handlers")?;

    let outcome = run(settings, &cleanup).await;
    // Failures caused by a signal teardown are not reported.
    let code = match outcome {
        _ if cleanup.interrupted() => 0,
        Ok(outcome) => {
            tracing::info!("Session ended: {:?}", outcome.interact);
            0
        }
        Err(e) => {
            report(&e);
            1
        }
    };

    // Waits for a teardown already started by the signal handler.
    cleanup.run().await;
    let code = if cleanup.interrupted() { 0 } else { code };
    std::process::exit(code);
}

async fn run(
    settings: Settings,
    cleanup: &Arc<CleanupContext>,
) -> jupyter_o2::Result<SessionOutcome> {
    acquire_password(&settings, Arc::clone(cleanup.secrets())).await?;

    let resolver = HostResolver::with_fallback_groups(&settings.dns_server_groups);
    let orchestrator =
        SessionOrchestrator::new(settings, SshConnector, resolver, Arc::clone(cleanup));
    orchestrator.run().await
}

/// Ask for the password before any connection is made.
async fn acquire_password(
    settings: &Settings,
    secrets: Arc<SecretStore>,
) -> jupyter_o2::Result<()> {
    let pinentry_path = settings.pinentry_path.clone();
    let request = PromptRequest {
        prompt: "Enter your passphrase: ".to_string(),
        description: Some(format!(
            "Connect to O2 server for jupyter {}",
            settings.subcommand
        )),
        error: "No password entered".to_string(),
    };

    tokio::task::spawn_blocking(move || {
        let mut prompt = open_prompt(&pinentry_path)?;
        let acquired = secrets.acquire(prompt.as_mut(), &request, &non_empty);
        if let Err(e) = prompt.close() {
            tracing::debug!("Failed to close password prompt: {}", e);
        }
        acquired
    })
    .await
    .map_err(|e| jupyter_o2::Error::Io(std::io::Error::other(e)))?
}

fn report(error: &jupyter_o2::Error) {
    if error.is_timeout() {
        eprintln!("{}", "the timeout was reached.".red());
        eprintln!("{}", error.to_string().dimmed());
    } else {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }
}
