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

//! X11 forwarding: local display discovery and channel bridging.
//!
//! The remote sshd opens an `x11` channel for every client connection made
//! on the compute side. Each one is bridged to the local X server named by
//! `DISPLAY`, authenticated with the cookie reported by `xauth`.

use russh::client::Msg;
use russh::Channel;
use std::path::PathBuf;
use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;

use super::forward::relay;
use crate::error::{Error, Result};

const X11_TCP_BASE_PORT: u16 = 6000;
const X11_UNIX_DIR: &str = "/tmp/.X11-unix";
const DEFAULT_AUTH_PROTOCOL: &str = "MIT-MAGIC-COOKIE-1";

/// Where the local X server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTarget {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

/// A parsed local `DISPLAY` plus its authentication cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Display {
    pub display: String,
    pub target: DisplayTarget,
    pub screen: u32,
    pub auth_protocol: String,
    pub auth_cookie: String,
}

impl X11Display {
    /// Discover the local display from the environment and `xauth`.
    pub async fn from_env() -> Result<Self> {
        let display = std::env::var("DISPLAY")
            .map_err(|_| Error::Config("DISPLAY is not set".to_string()))?;
        let (target, screen) = parse_display(&display)?;
        let (auth_protocol, auth_cookie) = xauth_cookie(&display).await?;
        Ok(Self {
            display,
            target,
            screen,
            auth_protocol,
            auth_cookie,
        })
    }

    /// Bridge one server-opened X11 channel to the local display.
    pub async fn bridge(&self, channel: Channel<Msg>, cancel: CancellationToken) -> Result<()> {
        match &self.target {
            DisplayTarget::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                relay(stream, channel, cancel).await?;
            }
            DisplayTarget::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                relay(stream, channel, cancel).await?;
            }
        }
        Ok(())
    }
}

/// Parse `[host]:display[.screen]` into a socket target and screen number.
///
/// A leading `/` (launchd-style `DISPLAY` on macOS) names the socket path
/// directly.
pub fn parse_display(display: &str) -> Result<(DisplayTarget, u32)> {
    let invalid = || Error::Config(format!("cannot parse DISPLAY '{display}'"));
    let (host, rest) = display.rsplit_once(':').ok_or_else(invalid)?;
    let (number, screen) = match rest.split_once('.') {
        Some((number, screen)) => (number, screen.parse::<u32>().map_err(|_| invalid())?),
        None => (rest, 0),
    };
    let number: u16 = number.parse().map_err(|_| invalid())?;

    let target = if host.starts_with('/') {
        DisplayTarget::Unix(PathBuf::from(format!("{host}:{number}")))
    } else if host.is_empty() || host == "unix" {
        DisplayTarget::Unix(PathBuf::from(format!("{X11_UNIX_DIR}/X{number}")))
    } else {
        DisplayTarget::Tcp {
            host: host.to_string(),
            port: X11_TCP_BASE_PORT
                .checked_add(number)
                .ok_or_else(invalid)?,
        }
    };
    Ok((target, screen))
}

async fn xauth_cookie(display: &str) -> Result<(String, String)> {
    let output = tokio::process::Command::new("xauth")
        .arg("list")
        .arg(display)
        .output()
        .await
        .map_err(|e| Error::Config(format!("failed to run xauth: {e}")))?;
    if !output.status.success() {
        return Err(Error::Config(format!(
            "xauth exited with {}",
            output.status
        )));
    }
    parse_xauth_list(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| Error::Config(format!("no xauth cookie for {display}")))
}

/// Take protocol and cookie from the first `xauth list` line.
pub fn parse_xauth_list(listing: &str) -> Option<(String, String)> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _name = fields.next()?;
        let protocol = fields.next()?;
        let cookie = fields.next()?;
        (protocol == DEFAULT_AUTH_PROTOCOL).then(|| (protocol.to_string(), cookie.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_display() {
        let (target, screen) = parse_display(":0").unwrap();
        assert_eq!(target, DisplayTarget::Unix(PathBuf::from("/tmp/.X11-unix/X0")));
        assert_eq!(screen, 0);

        let (target, screen) = parse_display("unix:1.2").unwrap();
        assert_eq!(target, DisplayTarget::Unix(PathBuf::from("/tmp/.X11-unix/X1")));
        assert_eq!(screen, 2);
    }

    #[test]
    fn test_parse_tcp_display() {
        let (target, _) = parse_display("localhost:10.0").unwrap();
        assert_eq!(
            target,
            DisplayTarget::Tcp {
                host: "localhost".to_string(),
                port: 6010
            }
        );
    }

    #[test]
    fn test_parse_launchd_display() {
        let (target, _) = parse_display("/private/tmp/com.apple.launchd.abc/org.xquartz:0").unwrap();
        assert_eq!(
            target,
            DisplayTarget::Unix(PathBuf::from(
                "/private/tmp/com.apple.launchd.abc/org.xquartz:0"
            ))
        );
    }

    #[test]
    fn test_parse_invalid_display() {
        assert!(parse_display("nonsense").is_err());
        assert!(parse_display(":x").is_err());
    }

    #[test]
    fn test_parse_xauth_list() {
        let listing = "laptop/unix:0  MIT-MAGIC-COOKIE-1  0123456789abcdef\n";
        assert_eq!(
            parse_xauth_list(listing),
            Some((
                "MIT-MAGIC-COOKIE-1".to_string(),
                "0123456789abcdef".to_string()
            ))
        );
        assert_eq!(parse_xauth_list(""), None);
        assert_eq!(parse_xauth_list("laptop/unix:0  XDM-AUTHORIZATION-1  00\n"), None);
    }
}
