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

//! The jupyter-o2 workflow, one module per stage.

pub mod allocation;
pub mod browser;
pub mod cleanup;
pub mod launcher;
pub mod orchestrator;
pub mod tunnel;

pub use allocation::{Allocation, AllocationNegotiator, AllocationRequest};
pub use cleanup::{CleanupContext, ShutdownSignals};
pub use launcher::{ServiceLauncher, ServiceRequest};
pub use orchestrator::{
    Connector, PreparedRun, SessionOrchestrator, SessionOutcome, SshConnector,
};
pub use tunnel::{TunnelEstablisher, TunnelRequest};

/// Progress line for the user, printed on stdout next to the relayed output.
pub(crate) fn banner(line: std::fmt::Arguments<'_>) {
    println!("{line}");
}
