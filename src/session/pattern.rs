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

//! Named terminal output patterns and armed pattern sets.
//!
//! Remote output is unstructured text shared by the login shell, the batch
//! scheduler and the launched service. Each boundary the workflow waits for
//! is described by a [`PromptPattern`]; the literals are exposed here so test
//! fixtures can emit exactly what the matchers expect.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fmt;

use crate::error::{Error, Result};

/// Prompt the remote shell is switched to once it is under our control.
pub const SENTINEL_PROMPT: &str = "[PEXPECT]$ ";

/// Matches the sentinel prompt for both regular users and root.
pub const SENTINEL_PATTERN: &str = r"\[PEXPECT\][\$\#] ";

/// Switches the remote shell prompt to [`SENTINEL_PROMPT`].
///
/// The backslash keeps the echoed command line itself from matching.
pub const SET_SENTINEL_COMMAND: &str = r"unset PROMPT_COMMAND; PS1='[PEXPECT]\$ '";

/// An ssh password prompt such as `js123@compute-e-16-175's password: `.
pub const PASSWORD_PROMPT_PATTERN: &str = r"[\w-]+@[\w-]+'s password: ";

/// A conventional shell prompt terminator at the end of the received output.
pub const SHELL_PROMPT_PATTERN: &str = r"[\$#%>] ?$";

/// Printed by the sentinel shell when the user logs out of it.
pub const LOGOUT_TRIGGER: &[u8] = b"[PEXPECT]$ logout";

/// Reappearance of the sentinel prompt after a foreground process ended.
pub const SENTINEL_TRIGGER: &[u8] = SENTINEL_PROMPT.as_bytes();

static SENTINEL_RE: Lazy<Regex> = Lazy::new(|| compile(SENTINEL_PATTERN));
static PASSWORD_RE: Lazy<Regex> = Lazy::new(|| compile(PASSWORD_PROMPT_PATTERN));
static SHELL_RE: Lazy<Regex> = Lazy::new(|| compile(SHELL_PROMPT_PATTERN));

// Callers pass constant patterns or the port-only URL template.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in prompt pattern must compile")
}

/// The shape of an anticipated output boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    ShellPrompt,
    Password,
    ServiceUrl,
    Sentinel,
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShellPrompt => "shell prompt",
            Self::Password => "password prompt",
            Self::ServiceUrl => "service URL",
            Self::Sentinel => "sentinel prompt",
        };
        f.write_str(name)
    }
}

/// A tagged regular expression over raw output bytes.
#[derive(Debug, Clone)]
pub struct PromptPattern {
    kind: PromptKind,
    regex: Regex,
}

impl PromptPattern {
    pub fn new(kind: PromptKind, regex: Regex) -> Self {
        Self { kind, regex }
    }

    pub fn sentinel() -> Self {
        Self::new(PromptKind::Sentinel, SENTINEL_RE.clone())
    }

    pub fn password() -> Self {
        Self::new(PromptKind::Password, PASSWORD_RE.clone())
    }

    pub fn shell_prompt() -> Self {
        Self::new(PromptKind::ShellPrompt, SHELL_RE.clone())
    }

    /// A notebook-style access URL on `port` carrying a token, delimited by
    /// non-word characters on both sides. Group 1 is the bare URL.
    pub fn service_url(port: u16) -> Self {
        let pattern = service_url_pattern(port);
        Self::new(PromptKind::ServiceUrl, compile(&pattern))
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// Source of the service URL regex for `port`.
pub fn service_url_pattern(port: u16) -> String {
    format!(r"\W(https?://localhost:{port}/?\?token=\w+)\W")
}

/// A non-empty set of patterns armed on a session.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<PromptPattern>,
}

impl PatternSet {
    /// Build a set, rejecting an empty pattern list.
    pub fn new(patterns: Vec<PromptPattern>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::InvalidState(
                "a pattern set needs at least one pattern".to_string(),
            ));
        }
        Ok(Self { patterns })
    }

    pub fn single(pattern: PromptPattern) -> Self {
        Self {
            patterns: vec![pattern],
        }
    }

    pub fn patterns(&self) -> &[PromptPattern] {
        &self.patterns
    }

    /// Earliest match in `haystack`; ties go to the pattern listed first.
    pub(crate) fn find(&self, haystack: &[u8]) -> Option<Found> {
        let mut best: Option<Found> = None;
        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(caps) = pattern.regex.captures(haystack) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.start <= whole.start()) {
                continue;
            }
            best = Some(Found {
                index,
                kind: pattern.kind,
                start: whole.start(),
                end: whole.end(),
                capture: caps.get(1).map(|m| m.as_bytes().to_vec()),
            });
        }
        best
    }

    /// Short label used in timeout diagnostics.
    pub fn describe(&self) -> String {
        let kinds: Vec<String> = self.patterns.iter().map(|p| p.kind.to_string()).collect();
        kinds.join(" or ")
    }
}

impl From<PromptPattern> for PatternSet {
    fn from(pattern: PromptPattern) -> Self {
        Self::single(pattern)
    }
}

pub(crate) struct Found {
    pub index: usize,
    pub kind: PromptKind,
    pub start: usize,
    pub end: usize,
    pub capture: Option<Vec<u8>>,
}

/// Result of a successful `expect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PromptKind,
    /// Position of the matched pattern in the armed set.
    pub index: usize,
    /// Every byte received since the previous match, up to this one.
    pub before: Vec<u8>,
    /// The bytes that matched.
    pub matched: Vec<u8>,
    /// First capture group, if the pattern defines one.
    pub capture: Option<Vec<u8>>,
}

impl PatternMatch {
    pub fn before_text(&self) -> String {
        String::from_utf8_lossy(&self.before).into_owned()
    }

    /// The line printed right after the echoed command, as produced by a
    /// command whose output is a single line.
    pub fn command_output_line(&self) -> Option<String> {
        let text = self.before_text();
        text.trim()
            .split('\n')
            .nth(1)
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    }
}
