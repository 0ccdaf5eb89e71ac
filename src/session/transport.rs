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

//! The byte-stream seam between [`PatternSession`](super::PatternSession)
//! and an actual remote shell.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// A bidirectional byte stream to an interactive remote shell.
///
/// Implemented by the SSH shell channel and by scripted test fixtures.
#[async_trait]
pub trait ShellTransport: Send {
    /// Write every byte of `data` to the remote shell.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next chunk of remote output.
    ///
    /// Returns `Ok(None)` once the remote end has closed. Must be cancel-safe:
    /// dropping the future before it completes loses no data.
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Propagate a local terminal size change.
    async fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    /// Close the stream gracefully.
    async fn close(&mut self) -> Result<()>;

    /// A handle that can tear the connection down from another task.
    fn closer(&self) -> Arc<dyn TransportCloser>;
}

/// Out-of-band teardown for a transport, used by the interrupt path.
#[async_trait]
pub trait TransportCloser: Send + Sync {
    /// Tear the connection down without waiting for the remote side.
    ///
    /// Must be idempotent.
    async fn force_close(&self);

    fn is_closed(&self) -> bool;
}
