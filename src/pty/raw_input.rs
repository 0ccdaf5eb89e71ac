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

//! Raw byte stdin reader for passthrough mode.
//!
//! Bytes are forwarded untouched (arrow keys, control characters, terminal
//! query responses) so the remote shell sees exactly what was typed. The
//! terminal must already be in raw mode.

use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

pub struct RawInputReader {
    stdin: io::Stdin,
}

impl RawInputReader {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }

    /// Wait up to `timeout` for input. `Ok(false)` on timeout or EINTR.
    pub fn poll(&self, timeout: Duration) -> io::Result<bool> {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
        use std::os::unix::io::BorrowedFd;

        let fd = self.stdin.as_raw_fd();
        // SAFETY: stdin outlives this borrow, which ends with the function.
        let borrowed_fd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut poll_fds = [PollFd::new(borrowed_fd, PollFlags::POLLIN)];

        let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        match poll(&mut poll_fds, PollTimeout::from(timeout_ms)) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
        }
    }

    /// Read available bytes; 0 means EOF.
    pub fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buffer)
    }
}

impl Default for RawInputReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_returns() {
        let reader = RawInputReader::new();
        assert!(reader.poll(Duration::from_millis(10)).is_ok());
    }
}
