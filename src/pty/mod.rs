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

//! Local terminal support for interactive passthrough.
//!
//! Provides the raw-mode guard, a raw stdin reader running on the blocking
//! pool, and SIGWINCH-driven resize events, all delivered to the passthrough
//! loop over one channel.

pub mod raw_input;
pub mod terminal;

pub use raw_input::RawInputReader;
pub use terminal::{force_terminal_cleanup, TerminalStateGuard};

use std::io;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const INPUT_CHANNEL_CAPACITY: usize = 256;
const INPUT_POLL_TIMEOUT: Duration = Duration::from_millis(50);
const INPUT_BUFFER_SIZE: usize = 1024;

/// Events delivered to the passthrough loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassthroughEvent {
    /// Bytes typed by the user.
    Input(Vec<u8>),
    /// The local terminal was resized.
    Resize { cols: u16, rows: u16 },
}

/// Background readers feeding a passthrough loop.
pub struct LocalInput {
    pub events: mpsc::Receiver<PassthroughEvent>,
    /// Stops the stdin reader and the resize watcher.
    pub cancel: CancellationToken,
}

/// Current local terminal size as (columns, rows).
pub fn terminal_size() -> io::Result<(u16, u16)> {
    crossterm::terminal::size()
}

/// Start reading raw stdin and watching for window size changes.
///
/// The terminal should already be in raw mode.
pub fn spawn_local_input() -> LocalInput {
    let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let input_tx = tx.clone();
    let input_cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
        let mut reader = RawInputReader::new();
        let mut buffer = [0u8; INPUT_BUFFER_SIZE];
        while !input_cancel.is_cancelled() {
            match reader.poll(INPUT_POLL_TIMEOUT) {
                Ok(true) => match reader.read(&mut buffer) {
                    Ok(0) => {
                        tracing::debug!("EOF received on stdin");
                        break;
                    }
                    Ok(n) => {
                        let event = PassthroughEvent::Input(buffer[..n].to_vec());
                        if input_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Input error: {e}");
                        break;
                    }
                },
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!("Poll error: {e}");
                    break;
                }
            }
        }
    });

    let resize_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut winch = match signal(SignalKind::window_change()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("Resize notifications unavailable: {e}");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = resize_cancel.cancelled() => break,
                received = winch.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if let Ok((cols, rows)) = terminal_size() {
                        if tx.send(PassthroughEvent::Resize { cols, rows }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    LocalInput { events: rx, cancel }
}
