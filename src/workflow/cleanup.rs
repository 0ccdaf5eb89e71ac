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

//! Process-wide teardown shared by the normal exit path and the signal path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::pty::force_terminal_cleanup;
use crate::secret::SecretStore;
use crate::session::TransportCloser;

/// Everything the teardown routine may have to release.
///
/// Built before the first session opens; sessions are registered as they
/// come up, so a signal at any point only sees what actually exists.
pub struct CleanupContext {
    secrets: Arc<SecretStore>,
    sessions: Mutex<Vec<(String, Arc<dyn TransportCloser>)>>,
    started: AtomicBool,
    interrupted: AtomicBool,
    done: OnceCell<()>,
}

/// Listeners for the signals that end a run.
pub struct ShutdownSignals {
    interrupt: SignalStream,
    terminate: SignalStream,
    hangup: SignalStream,
    abort: SignalStream,
}

impl ShutdownSignals {
    /// Register the listeners. From here on these signals no longer kill
    /// the process directly.
    pub fn new() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            abort: signal(SignalKind::from_raw(Signal::SIGABRT as i32))?,
        })
    }

    /// Wait for the first of them and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.abort.recv() => "SIGABRT",
        }
    }
}

impl CleanupContext {
    pub fn new(secrets: Arc<SecretStore>) -> Arc<Self> {
        Arc::new(Self {
            secrets,
            sessions: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            done: OnceCell::new(),
        })
    }

    pub fn secrets(&self) -> &Arc<SecretStore> {
        &self.secrets
    }

    /// Track a session so teardown can force-close it.
    pub fn register_session(&self, label: impl Into<String>, closer: Arc<dyn TransportCloser>) {
        let label = label.into();
        tracing::debug!("Registered {} for cleanup", label);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label, closer));
    }

    pub fn has_run(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether a shutdown signal started the teardown.
    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Scrub the credential, restore the terminal and force-close every
    /// registered session.
    ///
    /// Only the first call does the work. Later and concurrent callers
    /// return once it has finished.
    pub async fn run(&self) {
        if self.done.initialized() {
            tracing::debug!("Cleanup already ran");
            return;
        }
        self.done.get_or_init(|| self.teardown()).await;
    }

    async fn teardown(&self) {
        self.started.store(true, Ordering::SeqCst);
        println!("Cleaning up\r");

        self.secrets.dispose();
        force_terminal_cleanup();

        let sessions = std::mem::take(
            &mut *self.sessions.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (label, closer) in sessions {
            if closer.is_closed() {
                continue;
            }
            println!("Closing {label}\r");
            closer.force_close().await;
        }
    }

    /// Wait for a shutdown signal, then tear down. Returns the signal name.
    pub async fn teardown_on_signal(&self, mut signals: ShutdownSignals) -> &'static str {
        let name = signals.recv().await;
        tracing::info!("Received {}", name);
        self.interrupted.store(true, Ordering::SeqCst);
        self.run().await;
        name
    }

    /// Run the teardown and exit with status 0 on SIGINT, SIGTERM, SIGHUP
    /// or SIGABRT.
    pub fn install_signal_handlers(self: &Arc<Self>) -> Result<()> {
        let signals = ShutdownSignals::new()?;
        let context = Arc::clone(self);
        tokio::spawn(async move {
            context.teardown_on_signal(signals).await;
            std::process::exit(0);
        });
        Ok(())
    }
}
