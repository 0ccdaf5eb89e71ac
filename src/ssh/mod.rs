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

//! SSH transport built on russh: password login, host key policy, a PTY
//! shell channel, local port forwarding and X11 forwarding.

mod authentication;
pub mod forward;
pub mod handler;
pub mod known_hosts;
pub mod shell;
pub mod x11;

pub use handler::ClientHandler;
pub use known_hosts::HostKeyChecking;
pub use shell::{ConnectOptions, SshCloser, SshShell};
