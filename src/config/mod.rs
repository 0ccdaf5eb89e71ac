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

//! Configuration management for jupyter-o2.

mod loader;
mod types;
mod utils;

pub use loader::default_config_path;
pub use types::{default_dns_server_groups, Config, Overrides, Settings};
pub use types::{
    DEFAULT_CORES, DEFAULT_HOST, DEFAULT_MEM, DEFAULT_PARTITION, DEFAULT_PORT,
    DEFAULT_SOURCE_JUPYTER_CALL, DEFAULT_TIME,
};
pub use utils::{default_pinentry_path, expand_tilde};
