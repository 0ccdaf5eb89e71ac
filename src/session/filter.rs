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

//! Decides which received chunks are mirrored to the user.

use std::fmt;

/// Mirroring policy applied to every chunk read from the remote shell.
///
/// The filter only affects what the user sees. Pattern matching always runs
/// on the full stream.
#[derive(Default)]
pub enum OutputFilter {
    /// Mirror nothing. Used while a credential may be echoed back.
    #[default]
    Silent,
    /// Mirror everything.
    Echo,
    /// Mirror a chunk only when it starts with the given bytes.
    StartsWith(Vec<u8>),
    /// Mirror a chunk when the predicate accepts it.
    Predicate(Box<dyn Fn(&[u8]) -> bool + Send + Sync>),
}

impl OutputFilter {
    pub fn starts_with(prefix: impl Into<Vec<u8>>) -> Self {
        Self::StartsWith(prefix.into())
    }

    pub fn predicate(f: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Box::new(f))
    }

    pub fn admits(&self, chunk: &[u8]) -> bool {
        match self {
            Self::Silent => false,
            Self::Echo => true,
            Self::StartsWith(prefix) => chunk.starts_with(prefix),
            Self::Predicate(f) => f(chunk),
        }
    }
}

impl fmt::Debug for OutputFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "Silent"),
            Self::Echo => write!(f, "Echo"),
            Self::StartsWith(prefix) => {
                write!(f, "StartsWith({:?})", String::from_utf8_lossy(prefix))
            }
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters() {
        assert!(!OutputFilter::Silent.admits(b"anything"));
        assert!(OutputFilter::Echo.admits(b"anything"));

        let srun = OutputFilter::starts_with("srun");
        assert!(srun.admits(b"srun -t 0-3:00 --mem 1G"));
        assert!(!srun.admits(b"js123@login01's password: "));
        assert!(!srun.admits(b""));

        let short = OutputFilter::predicate(|chunk| chunk.len() < 4);
        assert!(short.admits(b"abc"));
        assert!(!short.admits(b"abcd"));
    }
}
