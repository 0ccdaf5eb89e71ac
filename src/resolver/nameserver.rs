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

//! Resolution against an explicit list of nameservers.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;

use super::{LookupFailure, ResolverStrategy};

const DNS_PORT: u16 = 53;
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Queries the given nameservers directly, bypassing the system configuration.
#[derive(Debug, Clone)]
pub struct NameserverResolver {
    nameservers: Vec<IpAddr>,
}

impl NameserverResolver {
    pub fn new(nameservers: Vec<IpAddr>) -> Self {
        Self { nameservers }
    }

    fn build(&self) -> TokioAsyncResolver {
        let group = NameServerConfigGroup::from_ips_clear(&self.nameservers, DNS_PORT, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.timeout = QUERY_TIMEOUT;
        opts.attempts = 1;
        TokioAsyncResolver::tokio(config, opts)
    }
}

fn classify(err: ResolveError) -> LookupFailure {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            LookupFailure::NoSuchDomain
        }
        _ => LookupFailure::Failed(err.to_string()),
    }
}

#[async_trait]
impl ResolverStrategy for NameserverResolver {
    fn describe(&self) -> String {
        let servers: Vec<String> = self.nameservers.iter().map(IpAddr::to_string).collect();
        format!("[{}]", servers.join(", "))
    }

    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupFailure> {
        let resolver = self.build();
        let response = resolver.lookup_ip(host).await.map_err(classify)?;
        Ok(response.iter().collect())
    }
}
