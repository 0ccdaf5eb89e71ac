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

use std::process::{Child, Command, Stdio};

/// Open `url` in the desktop browser without waiting for it.
pub fn open(url: &str) {
    match spawn_opener(url) {
        Ok(child) => {
            tracing::debug!("Opened browser for {}", url);
            reap(child);
        }
        Err(e) => tracing::warn!("Could not open a browser ({}); open the URL manually", e),
    }
}

fn spawn_opener(url: &str) -> std::io::Result<Child> {
    #[cfg(target_os = "macos")]
    {
        quiet(Command::new("open").arg(url)).spawn()
    }
    #[cfg(target_os = "linux")]
    {
        quiet(Command::new("xdg-open").arg(url)).spawn()
    }
    #[cfg(target_os = "windows")]
    {
        quiet(Command::new("cmd").args(["/C", "start", url])).spawn()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = url;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unsupported platform",
        ))
    }
}

// The opener's chatter would land in the relayed terminal.
fn quiet(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
}

/// Wait for the opener in the background so it does not linger as a zombie.
fn reap(mut child: Child) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || match child.wait() {
        Ok(status) if !status.success() => {
            tracing::debug!("Browser opener exited with {}", status);
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("Failed to wait for browser opener: {}", e),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reap_collects_exited_opener() {
        let child = quiet(&mut Command::new("true")).spawn().unwrap();
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);

        reap(child).await.unwrap();

        // Already waited for: the pid is no longer our child.
        let err = nix::sys::wait::waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG))
            .unwrap_err();
        assert_eq!(err, nix::errno::Errno::ECHILD);
    }
}
