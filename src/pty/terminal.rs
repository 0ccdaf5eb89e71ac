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

//! Local terminal raw-mode management.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use once_cell::sync::Lazy;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, PoisonError,
};

use crate::error::Result;

/// Serializes raw-mode transitions between the guard and the cleanup path.
static TERMINAL_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static RAW_MODE_ACTIVE: AtomicBool = AtomicBool::new(false);

fn lock_terminal() -> MutexGuard<'static, ()> {
    TERMINAL_MUTEX.lock().unwrap_or_else(PoisonError::into_inner)
}

/// RAII guard that holds the local terminal in raw mode.
///
/// Raw mode is left when the guard drops, or earlier if
/// [`force_terminal_cleanup`] runs on the interrupt path.
#[derive(Debug)]
pub struct TerminalStateGuard {
    entered: bool,
}

impl TerminalStateGuard {
    /// Enter raw mode unless it is already active.
    pub fn new() -> Result<Self> {
        let _lock = lock_terminal();
        let mut entered = false;
        if !RAW_MODE_ACTIVE.load(Ordering::SeqCst) {
            enable_raw_mode()?;
            RAW_MODE_ACTIVE.store(true, Ordering::SeqCst);
            entered = true;
        }
        Ok(Self { entered })
    }

    /// Whether this guard switched the terminal into raw mode.
    pub fn entered_raw_mode(&self) -> bool {
        self.entered
    }
}

impl Drop for TerminalStateGuard {
    fn drop(&mut self) {
        if self.entered {
            force_terminal_cleanup();
        }
    }
}

/// Leave raw mode if it is active. Safe to call from anywhere, repeatedly.
pub fn force_terminal_cleanup() {
    let _lock = lock_terminal();
    if RAW_MODE_ACTIVE.load(Ordering::SeqCst) {
        if let Err(e) = disable_raw_mode() {
            eprintln!("Warning: Failed to disable raw mode during cleanup: {e}");
        } else {
            RAW_MODE_ACTIVE.store(false, Ordering::SeqCst);
        }
    }
}

/// Whether raw mode is currently active.
pub fn is_raw_mode_active() -> bool {
    RAW_MODE_ACTIVE.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cleanup_without_raw_mode_is_noop() {
        assert!(!is_raw_mode_active());
        force_terminal_cleanup();
        force_terminal_cleanup();
        assert!(!is_raw_mode_active());
    }
}
