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

//! Scripted shell transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jupyter_o2::session::{ShellTransport, TransportCloser};
use jupyter_o2::Result;

/// Counts forced closes.
#[derive(Debug, Default)]
pub struct CountingCloser {
    pub closes: AtomicUsize,
}

impl CountingCloser {
    pub fn count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportCloser for CountingCloser {
    async fn force_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.count() > 0
    }
}

/// Replies sent once a written line contains `when`.
struct Rule {
    when: Vec<u8>,
    echo: bool,
    replies: Vec<Vec<u8>>,
    used: bool,
}

/// What the test can inspect after the transport was moved into a session.
#[derive(Debug, Default)]
pub struct Recorded {
    pub written: Vec<u8>,
    pub resizes: Vec<(u16, u16)>,
    pub graceful_closes: usize,
}

impl Recorded {
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

/// Plays back canned output in response to the lines it receives.
///
/// Each rule fires at most once, in order of declaration among the rules
/// that match. When nothing is queued, reads wait forever unless the script
/// was told to end.
pub struct ScriptedTransport {
    queued: VecDeque<Vec<u8>>,
    rules: Vec<Rule>,
    line: Vec<u8>,
    ends: bool,
    recorded: Arc<Mutex<Recorded>>,
    closer: Arc<CountingCloser>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            rules: Vec::new(),
            line: Vec::new(),
            ends: false,
            recorded: Arc::new(Mutex::new(Recorded::default())),
            closer: Arc::new(CountingCloser::default()),
        }
    }

    /// Output available before anything is written.
    pub fn initially(mut self, chunk: impl AsRef<[u8]>) -> Self {
        self.queued.push_back(chunk.as_ref().to_vec());
        self
    }

    /// When a line containing `when` is written, echo it like a TTY and
    /// then emit `replies` as separate chunks.
    pub fn on(mut self, when: impl AsRef<[u8]>, replies: &[&str]) -> Self {
        self.rules.push(Rule {
            when: when.as_ref().to_vec(),
            echo: true,
            replies: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            used: false,
        });
        self
    }

    /// Like [`on`](Self::on) without the echo, as at a password prompt.
    pub fn on_silent(mut self, when: impl AsRef<[u8]>, replies: &[&str]) -> Self {
        self.rules.push(Rule {
            when: when.as_ref().to_vec(),
            echo: false,
            replies: replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
            used: false,
        });
        self
    }

    /// Report end of stream once the queue is empty.
    pub fn then_end(mut self) -> Self {
        self.ends = true;
        self
    }

    pub fn recorded(&self) -> Arc<Mutex<Recorded>> {
        Arc::clone(&self.recorded)
    }

    pub fn counting_closer(&self) -> Arc<CountingCloser> {
        Arc::clone(&self.closer)
    }

    fn on_line(&mut self, line: &[u8]) {
        let Some(rule) = self
            .rules
            .iter_mut()
            .find(|rule| !rule.used && contains(line, &rule.when))
        else {
            return;
        };
        rule.used = true;
        if rule.echo {
            let mut echo = line.to_vec();
            echo.extend_from_slice(b"\r\n");
            self.queued.push_back(echo);
        }
        for reply in &rule.replies {
            self.queued.push_back(reply.clone());
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[async_trait]
impl ShellTransport for ScriptedTransport {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.recorded.lock().unwrap().written.extend_from_slice(data);
        for &byte in data {
            match byte {
                b'\n' => {
                    let line = std::mem::take(&mut self.line);
                    self.on_line(&line);
                }
                // Ctrl-D at an empty prompt ends the shell without a newline.
                0x04 => {
                    self.line.push(byte);
                    let line = std::mem::take(&mut self.line);
                    self.on_line(&line);
                }
                _ => self.line.push(byte),
            }
        }
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(chunk) = self.queued.pop_front() {
            return Ok(Some(chunk));
        }
        if self.ends {
            return Ok(None);
        }
        std::future::pending::<()>().await;
        Ok(None)
    }

    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.recorded.lock().unwrap().resizes.push((cols, rows));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.recorded.lock().unwrap().graceful_closes += 1;
        Ok(())
    }

    fn closer(&self) -> Arc<dyn TransportCloser> {
        self.closer.clone()
    }
}

/// A `Write` whose contents stay readable after being boxed into a session.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub const PASSWORD: &str = "hunter2";

/// A login shell on the O2 login node that goes through a full allocation.
pub fn allocation_script() -> ScriptedTransport {
    use jupyter_o2::session::pattern::SET_SENTINEL_COMMAND;

    ScriptedTransport::new()
        .initially("Last login: Mon Oct  5 09:12:44 2026\r\n[js123@login01 ~]$ ")
        .on(SET_SENTINEL_COMMAND, &["[PEXPECT]$ "])
        .on("echo $HOSTNAME", &["login01\r\n", "[PEXPECT]$ "])
        .on(
            "srun",
            &[
                "srun: job 4242 queued and waiting for resources\r\n",
                "srun: job 4242 has been allocated resources\r\n",
                "js123@compute-e-16-175's password: ",
            ],
        )
        .on_silent(PASSWORD, &["\r\n[js123@compute-e-16-175 ~]$ "])
        .on(SET_SENTINEL_COMMAND, &["[PEXPECT]$ "])
        .on("hostname | sed", &["compute-e-16-175\r\n", "[PEXPECT]$ "])
}
