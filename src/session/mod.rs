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

//! Pattern-driven remote shell sessions.
//!
//! A [`PatternSession`] owns one remote shell stream and moves through two
//! modes. In *scripted* mode the caller sends command lines and blocks until
//! the output matches one of the armed patterns. [`PatternSession::interact`]
//! is the only way into *passthrough* mode, where the local terminal is
//! relayed to the remote shell until an exit trigger shows up in the output.

pub mod filter;
pub mod pattern;
pub mod transport;

pub use filter::OutputFilter;
pub use pattern::{PatternMatch, PatternSet, PromptKind, PromptPattern};
pub use transport::{ShellTransport, TransportCloser};

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::pty::{self, PassthroughEvent, TerminalStateGuard};

/// How long a possible start of the exit trigger is held back from the
/// terminal waiting for the rest of it.
const TRIGGER_HOLD: Duration = Duration::from_millis(50);

/// Current mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Commands are sent and output is matched against the armed patterns.
    Scripted,
    /// The local terminal is relayed to the remote shell.
    Passthrough,
    /// The transport has been closed.
    Closed,
}

/// How passthrough mode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractOutcome {
    /// The exit trigger appeared in the remote output.
    ExitTriggered,
    /// The remote end closed the stream.
    RemoteClosed,
}

/// One remote shell driven by pattern matching on its output.
pub struct PatternSession<T: ShellTransport> {
    transport: T,
    closer: Arc<dyn TransportCloser>,
    label: String,
    buffer: Vec<u8>,
    armed: PatternSet,
    filter: OutputFilter,
    mirror: Box<dyn Write + Send>,
    mode: SessionMode,
    default_timeout: Duration,
}

impl<T: ShellTransport> PatternSession<T> {
    /// Wrap an authenticated shell stream.
    ///
    /// The session starts with the generic shell prompt armed, output
    /// mirroring off and stdout as the mirror target.
    pub fn new(transport: T, label: impl Into<String>, default_timeout: Duration) -> Self {
        let closer = transport.closer();
        Self {
            transport,
            closer,
            label: label.into(),
            buffer: Vec::new(),
            armed: PatternSet::single(PromptPattern::shell_prompt()),
            filter: OutputFilter::Silent,
            mirror: Box::new(std::io::stdout()),
            mode: SessionMode::Scripted,
            default_timeout,
        }
    }

    /// Replace the writer that mirrored output goes to.
    pub fn with_mirror(mut self, mirror: impl Write + Send + 'static) -> Self {
        self.mirror = Box::new(mirror);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.mode == SessionMode::Closed
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Handle for tearing this session down from the interrupt path.
    pub fn closer(&self) -> Arc<dyn TransportCloser> {
        self.closer.clone()
    }

    pub fn armed(&self) -> &PatternSet {
        &self.armed
    }

    /// Replace the expected pattern set.
    pub fn arm(&mut self, patterns: impl Into<PatternSet>) {
        self.armed = patterns.into();
    }

    /// Change which received chunks are mirrored to the user.
    pub fn set_output_filter(&mut self, filter: OutputFilter) {
        self.filter = filter;
    }

    fn require_scripted(&self, operation: &str) -> Result<()> {
        match self.mode {
            SessionMode::Scripted => Ok(()),
            mode => Err(Error::InvalidState(format!(
                "cannot {operation} on {} session in {mode:?} mode",
                self.label
            ))),
        }
    }

    /// Send `line` followed by a newline. Does not wait for a response.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.require_scripted("send")?;
        tracing::trace!("[{}] send {} bytes", self.label, line.len() + 1);
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.transport.write_all(&bytes).await
    }

    /// Write bytes exactly as given, e.g. a credential answering a prompt.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_scripted("write")?;
        self.transport.write_all(bytes).await
    }

    /// Wait for the armed patterns using the session's default timeout.
    pub async fn expect(&mut self) -> Result<PatternMatch> {
        self.expect_within(self.default_timeout).await
    }

    /// Wait until the output matches one of the armed patterns.
    ///
    /// On success the buffer is advanced past the match. On timeout the
    /// buffered output is kept and [`Error::Timeout`] is returned.
    pub async fn expect_within(&mut self, timeout: Duration) -> Result<PatternMatch> {
        self.require_scripted("expect")?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.armed.find(&self.buffer) {
                let rest = self.buffer.split_off(found.end);
                let mut consumed = std::mem::replace(&mut self.buffer, rest);
                let matched = consumed.split_off(found.start);
                tracing::debug!("[{}] matched {}", self.label, found.kind);
                return Ok(PatternMatch {
                    kind: found.kind,
                    index: found.index,
                    before: consumed,
                    matched,
                    capture: found.capture,
                });
            }

            let chunk = match tokio::time::timeout_at(deadline, self.transport.read_chunk()).await
            {
                Ok(chunk) => chunk?,
                Err(_) => {
                    let step = format!("{} on the {} session", self.armed.describe(), self.label);
                    return Err(Error::timeout(step, timeout));
                }
            };
            match chunk {
                Some(data) => self.ingest(data),
                None => {
                    tracing::debug!("[{}] remote closed while expecting", self.label);
                    self.mode = SessionMode::Closed;
                    return Err(Error::SessionClosed);
                }
            }
        }
    }

    fn ingest(&mut self, data: Vec<u8>) {
        self.mirror_chunk(&data);
        self.buffer.extend_from_slice(&data);
    }

    fn mirror_chunk(&mut self, data: &[u8]) {
        if self.filter.admits(data) {
            if let Err(e) = self.mirror.write_all(data).and_then(|_| self.mirror.flush()) {
                tracing::warn!("[{}] failed to mirror output: {}", self.label, e);
            }
        }
    }

    /// Set the sentinel prompt and wait for it.
    pub async fn set_unique_prompt(&mut self) -> Result<PatternMatch> {
        self.arm(PromptPattern::sentinel());
        self.send(pattern::SET_SENTINEL_COMMAND).await?;
        self.expect().await
    }

    /// Consume prompts that are already pending, waiting at most `poll` for
    /// each. Returns how many were consumed; zero is fine.
    pub async fn drain_prompts(&mut self, poll: Duration) -> Result<usize> {
        let mut drained = 0;
        loop {
            match self.expect_within(poll).await {
                Ok(_) => drained += 1,
                Err(e) if e.is_timeout() => return Ok(drained),
                Err(e) => return Err(e),
            }
        }
    }

    /// Mirror output through the current filter until the remote end closes.
    ///
    /// Used for sessions that only hold a forward open.
    pub async fn follow(&mut self) -> Result<()> {
        self.require_scripted("follow")?;
        self.buffer.clear();
        while let Some(data) = self.transport.read_chunk().await? {
            self.mirror_chunk(&data);
        }
        self.mode = SessionMode::Closed;
        Ok(())
    }

    /// Hand the local terminal to the remote shell until `trigger` appears.
    ///
    /// Puts the terminal in raw mode for the duration and propagates window
    /// size changes.
    pub async fn interact(&mut self, trigger: &[u8]) -> Result<InteractOutcome> {
        self.require_scripted("interact")?;
        let _guard = TerminalStateGuard::new()?;
        let input = pty::spawn_local_input();
        if let Ok((cols, rows)) = pty::terminal_size() {
            if let Err(e) = self.transport.resize(cols, rows).await {
                tracing::debug!("[{}] initial resize failed: {}", self.label, e);
            }
        }
        let mut stdout = std::io::stdout();
        let outcome = self.interact_with(trigger, input.events, &mut stdout).await;
        input.cancel.cancel();
        outcome
    }

    /// Passthrough loop over an arbitrary input source and output sink.
    pub async fn interact_with<W: Write>(
        &mut self,
        trigger: &[u8],
        mut events: mpsc::Receiver<PassthroughEvent>,
        out: &mut W,
    ) -> Result<InteractOutcome> {
        self.require_scripted("interact")?;
        if trigger.is_empty() {
            return Err(Error::InvalidState("empty exit trigger".to_string()));
        }
        self.mode = SessionMode::Passthrough;
        tracing::debug!("[{}] entering passthrough", self.label);

        let mut detector = TriggerDetector::new(trigger);
        // Output still buffered was already mirrored if the filter admits it.
        let pending = std::mem::take(&mut self.buffer);
        let triggered = if self.filter.admits(&pending) {
            let scan = detector.feed(&pending);
            detector.mark_printed();
            scan.triggered
        } else {
            relay(&mut detector, &pending, out)?
        };
        if triggered {
            return Ok(InteractOutcome::ExitTriggered);
        }

        let mut input_open = true;
        let mut flush_at = detector.is_holding().then(|| Instant::now() + TRIGGER_HOLD);
        loop {
            let release_at = flush_at.unwrap_or_else(Instant::now);
            tokio::select! {
                chunk = self.transport.read_chunk() => {
                    match chunk? {
                        Some(data) => {
                            if relay(&mut detector, &data, out)? {
                                return Ok(InteractOutcome::ExitTriggered);
                            }
                            flush_at = detector
                                .is_holding()
                                .then(|| Instant::now() + TRIGGER_HOLD);
                        }
                        None => {
                            out.write_all(&detector.release_held())?;
                            out.flush()?;
                            self.mode = SessionMode::Closed;
                            return Ok(InteractOutcome::RemoteClosed);
                        }
                    }
                }
                event = events.recv(), if input_open => {
                    match event {
                        Some(PassthroughEvent::Input(bytes)) => {
                            self.transport.write_all(&bytes).await?;
                        }
                        Some(PassthroughEvent::Resize { cols, rows }) => {
                            if let Err(e) = self.transport.resize(cols, rows).await {
                                tracing::warn!("Failed to send window resize to remote: {e}");
                            }
                        }
                        None => {
                            tracing::debug!("[{}] local input closed", self.label);
                            input_open = false;
                        }
                    }
                }
                _ = tokio::time::sleep_until(release_at), if flush_at.is_some() => {
                    flush_at = None;
                    out.write_all(&detector.release_held())?;
                    out.flush()?;
                }
            }
        }
    }

    /// Close the transport. Idempotent.
    ///
    /// `force` tears the connection down without a graceful channel close.
    pub async fn close(&mut self, force: bool) -> Result<()> {
        if self.mode == SessionMode::Closed && self.closer.is_closed() {
            return Ok(());
        }
        self.mode = SessionMode::Closed;
        if force {
            self.closer.force_close().await;
            Ok(())
        } else {
            self.transport.close().await
        }
    }
}

impl<T: ShellTransport> fmt::Debug for PatternSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSession")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("armed", &self.armed.describe())
            .field("filter", &self.filter)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Write what `detector` releases from `data` to `out`.
///
/// Returns `true` when the trigger was seen.
fn relay<W: Write>(detector: &mut TriggerDetector, data: &[u8], out: &mut W) -> Result<bool> {
    let scan = detector.feed(data);
    if !scan.emit.is_empty() {
        out.write_all(&scan.emit)?;
        out.flush()?;
    }
    Ok(scan.triggered)
}

/// Result of feeding one chunk to a [`TriggerDetector`].
#[derive(Debug, PartialEq, Eq)]
struct Scan {
    /// Bytes that may be shown now.
    emit: Vec<u8>,
    triggered: bool,
}

/// Finds a byte sequence in a stream that arrives in arbitrary chunks.
///
/// A chunk ending in a partial trigger has those bytes held back until the
/// next chunk decides them, so a split trigger is never shown.
#[derive(Debug)]
struct TriggerDetector {
    trigger: Vec<u8>,
    /// Up to `trigger.len() - 1` most recent bytes.
    context: Vec<u8>,
    /// Trailing bytes of `context` not yet shown.
    held: usize,
}

impl TriggerDetector {
    fn new(trigger: &[u8]) -> Self {
        Self {
            trigger: trigger.to_vec(),
            context: Vec::new(),
            held: 0,
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Scan {
        let printed = self.context.len() - self.held;
        let mut window = std::mem::take(&mut self.context);
        window.extend_from_slice(chunk);

        if let Some(pos) = window
            .windows(self.trigger.len())
            .position(|w| w == self.trigger.as_slice())
        {
            self.held = 0;
            return Scan {
                emit: window[printed..pos.max(printed)].to_vec(),
                triggered: true,
            };
        }

        let partial = (1..self.trigger.len().min(window.len() + 1))
            .rev()
            .find(|&k| window.ends_with(&self.trigger[..k]))
            .unwrap_or(0);
        let shown_until = (window.len() - partial).max(printed);
        let emit = window[printed..shown_until].to_vec();

        self.held = window.len() - shown_until;
        let keep = (self.trigger.len() - 1).min(window.len());
        self.context = window[window.len() - keep..].to_vec();
        Scan {
            emit,
            triggered: false,
        }
    }

    fn is_holding(&self) -> bool {
        self.held > 0
    }

    /// Show the held bytes. They still count towards a later match.
    fn release_held(&mut self) -> Vec<u8> {
        let held = self.context[self.context.len() - self.held..].to_vec();
        self.held = 0;
        held
    }

    /// Treat everything fed so far as already shown.
    fn mark_printed(&mut self) {
        self.held = 0;
    }
}
