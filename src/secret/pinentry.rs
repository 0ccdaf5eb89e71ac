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

//! Client for the pinentry secure-entry agent.
//!
//! pinentry speaks the Assuan line protocol on its stdin/stdout:
//! - every request is one line, answered by `OK` or `ERR <code> <text>`
//! - data lines (`D <percent-escaped data>`) precede the final `OK`
//! - status (`S ...`) and comment (`# ...`) lines may appear at any time
//!
//! The client is generic over its reader and writer so the protocol can be
//! exercised without spawning a process.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use zeroize::Zeroizing;

use super::{Credential, PromptRequest, SecretPrompt};
use crate::error::{Error, Result};

/// Outcome of one Assuan request.
#[derive(Debug)]
enum Reply {
    Ok(Option<Zeroizing<String>>),
    Err(String),
}

/// Assuan client speaking to a pinentry instance.
pub struct PinentryClient<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    greeted: bool,
    closed: bool,
}

impl<R: BufRead, W: Write> PinentryClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            greeted: false,
            closed: false,
        }
    }

    /// Read lines until the final `OK`/`ERR`, collecting `D` data.
    fn read_reply(&mut self) -> Result<Reply> {
        let mut data: Option<Zeroizing<String>> = None;
        loop {
            let mut line = Zeroizing::new(String::new());
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::PromptUnavailable(
                    "pinentry closed the connection".to_string(),
                ));
            }
            let line = line.trim_end_matches(['\r', '\n']);

            if line == "OK" || line.starts_with("OK ") {
                return Ok(Reply::Ok(data));
            } else if let Some(rest) = line.strip_prefix("ERR") {
                return Ok(Reply::Err(rest.trim().to_string()));
            } else if let Some(payload) = line.strip_prefix("D ") {
                let decoded = unescape(payload);
                match data.as_mut() {
                    Some(existing) => existing.push_str(&decoded),
                    None => data = Some(decoded),
                }
            } else if line.starts_with('#') || line.starts_with("S ") || line == "S" {
                tracing::trace!("pinentry status: {}", line);
            } else {
                tracing::debug!("Ignoring unexpected pinentry line");
            }
        }
    }

    fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send a request whose failure is tolerated (e.g. unsupported options).
    fn command(&mut self, line: &str) -> Result<bool> {
        self.send(line)?;
        match self.read_reply()? {
            Reply::Ok(_) => Ok(true),
            Reply::Err(reason) => {
                tracing::debug!("pinentry rejected '{}': {}", verb(line), reason);
                Ok(false)
            }
        }
    }

    fn greet(&mut self) -> Result<()> {
        if self.greeted {
            return Ok(());
        }
        match self.read_reply()? {
            Reply::Ok(_) => {}
            Reply::Err(reason) => {
                return Err(Error::PromptUnavailable(format!(
                    "pinentry did not start: {reason}"
                )))
            }
        }
        self.greeted = true;

        let lc_ctype = std::env::var("LC_CTYPE")
            .or_else(|_| std::env::var("LC_ALL"))
            .unwrap_or_else(|_| "en_US.UTF-8".to_string());
        self.command(&format!("OPTION lc-ctype={lc_ctype}"))?;

        if let Some(tty) = tty_name() {
            self.command(&format!("OPTION ttyname={tty}"))?;
        }
        if let Ok(term) = std::env::var("TERM") {
            if !term.is_empty() {
                self.command(&format!("OPTION ttytype={term}"))?;
            }
        }
        Ok(())
    }

    fn get_pin(&mut self) -> Result<Zeroizing<String>> {
        self.send("GETPIN")?;
        match self.read_reply()? {
            Reply::Ok(data) => Ok(data.unwrap_or_default()),
            Reply::Err(reason) if is_cancel(&reason) => {
                tracing::debug!("pinentry cancelled: {}", reason);
                Err(Error::PromptClosed)
            }
            Reply::Err(reason) => Err(Error::PromptUnavailable(format!(
                "pinentry GETPIN failed: {reason}"
            ))),
        }
    }

    fn prompt_for_pin(
        &mut self,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<Credential> {
        self.greet()?;

        if !request.prompt.is_empty() {
            self.command(&format!("SETPROMPT {}", escape(&request.prompt)))?;
        }
        if let Some(description) = &request.description {
            self.command(&format!("SETDESC {}", escape(description)))?;
        }

        let mut attempt = 0usize;
        loop {
            if attempt > 0 {
                self.command(&format!("SETERROR {}", escape(&request.error)))?;
            }
            attempt += 1;

            let pin = self.get_pin()?;
            if validator(&pin) {
                return Credential::new(pin.to_string());
            }
        }
    }
}

/// GPG_ERR_CANCELED, or a reason that says so.
fn is_cancel(reason: &str) -> bool {
    reason.starts_with("83886179") || reason.to_ascii_lowercase().contains("cancel")
}

impl<R: BufRead + Send, W: Write + Send> SecretPrompt for PinentryClient<R, W> {
    fn ask(
        &mut self,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<Credential> {
        if self.closed {
            return Err(Error::PromptClosed);
        }
        // A broken pipe means the agent died; the caller may fall back.
        self.prompt_for_pin(request, validator).map_err(|e| match e {
            Error::Io(io) => Error::PromptUnavailable(format!("pinentry I/O failed: {io}")),
            other => other,
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.send("BYE");
        }
        Ok(())
    }
}

/// A spawned pinentry process together with its protocol client.
pub struct PinentryProcess {
    child: Child,
    client: PinentryClient<BufReader<ChildStdout>, ChildStdin>,
}

impl PinentryProcess {
    /// Spawn the pinentry binary at `path`.
    pub fn spawn(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::PromptUnavailable(format!("failed to start {}: {e}", path.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::PromptUnavailable("pinentry stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::PromptUnavailable("pinentry stdout unavailable".to_string()))?;

        tracing::debug!("Started pinentry at {}", path.display());
        Ok(Self {
            child,
            client: PinentryClient::new(BufReader::new(stdout), stdin),
        })
    }
}

impl SecretPrompt for PinentryProcess {
    fn ask(
        &mut self,
        request: &PromptRequest,
        validator: &dyn Fn(&str) -> bool,
    ) -> Result<Credential> {
        self.client.ask(request, validator)
    }

    fn close(&mut self) -> Result<()> {
        self.client.close()?;
        if let Err(e) = self.child.kill() {
            tracing::trace!("pinentry already exited: {}", e);
        }
        let _ = self.child.wait();
        Ok(())
    }
}

impl Drop for PinentryProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// Percent-escape an Assuan argument.
pub fn escape(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\n', "%0A")
        .replace('\r', "%0D")
}

/// Decode `%XX` escapes in an Assuan data line.
pub fn unescape(text: &str) -> Zeroizing<String> {
    let bytes = text.as_bytes();
    let mut out = Zeroizing::new(Vec::with_capacity(bytes.len()));
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(value) = decoded {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    Zeroizing::new(String::from_utf8_lossy(&out).into_owned())
}

fn verb(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or(line)
}

fn tty_name() -> Option<String> {
    if let Ok(tty) = std::env::var("TTY") {
        return Some(tty);
    }
    nix::unistd::ttyname(std::io::stdout())
        .ok()
        .map(|path| path.display().to_string())
}
