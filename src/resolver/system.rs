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

use async_trait::async_trait;
use std::net::IpAddr;

use super::{LookupFailure, ResolverStrategy};

/// The platform resolver (`/etc/hosts`, `resolv.conf`, NSS).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl ResolverStrategy for SystemResolver {
    fn describe(&self) -> String {
        "system resolver".to_string()
    }

    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupFailure> {
        // getaddrinfo does not tell NXDOMAIN apart from other failures
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| LookupFailure::NoSuchDomain)?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_localhost_resolves() {
        let addrs = SystemResolver.lookup("localhost").await.unwrap();
        assert!(addrs.iter().any(|addr| addr.is_loopback()));
    }

    #[tokio::test]
    async fn test_literal_address() {
        let addrs = SystemResolver.lookup("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }
}
