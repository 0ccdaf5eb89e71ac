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

//! Hostname resolution with ordered fallback resolver configurations.
//!
//! Cluster login nodes are sometimes only visible to the institution's own
//! nameservers. [`HostResolver`] first asks the system resolver and, if that
//! reports that the name does not exist, retries against each configured
//! nameserver group in order. The first group that answers wins.

mod nameserver;
mod system;

pub use nameserver::NameserverResolver;
pub use system::SystemResolver;

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Why a single resolver configuration produced no address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The resolver answered authoritatively that the name does not exist.
    NoSuchDomain,
    /// Any other failure (timeout, unreachable nameserver, malformed reply).
    Failed(String),
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchDomain => write!(f, "no such domain"),
            Self::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

/// One resolver configuration.
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    /// Human-readable description, e.g. the nameserver list.
    fn describe(&self) -> String;

    /// Look up `host`, returning at least one address on success.
    async fn lookup(&self, host: &str) -> std::result::Result<Vec<IpAddr>, LookupFailure>;
}

/// Outcome of [`HostResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The first configuration resolved the name; connect using it unchanged.
    AsGiven(String),
    /// A fallback configuration resolved the name; connect to this address.
    ViaFallback(IpAddr),
    /// No configuration could resolve the name.
    Unresolved,
}

impl Resolution {
    /// The hostname or address to connect to, if any.
    pub fn target(&self) -> Option<String> {
        match self {
            Self::AsGiven(host) => Some(host.clone()),
            Self::ViaFallback(addr) => Some(addr.to_string()),
            Self::Unresolved => None,
        }
    }
}

/// Resolves hostnames across an ordered list of strategies.
pub struct HostResolver {
    strategies: Vec<Box<dyn ResolverStrategy>>,
}

impl HostResolver {
    pub fn new(strategies: Vec<Box<dyn ResolverStrategy>>) -> Self {
        Self { strategies }
    }

    /// System resolver first, then one [`NameserverResolver`] per group.
    pub fn with_fallback_groups(groups: &[Vec<IpAddr>]) -> Self {
        let mut strategies: Vec<Box<dyn ResolverStrategy>> = vec![Box::new(SystemResolver)];
        strategies.extend(
            groups
                .iter()
                .filter(|group| !group.is_empty())
                .map(|group| Box::new(NameserverResolver::new(group.clone())) as Box<_>),
        );
        Self::new(strategies)
    }

    /// Try each strategy in order, stopping at the first answer.
    pub async fn resolve(&self, host: &str) -> Resolution {
        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                println!(
                    "Could not resolve domain. Trying with nameservers: {}",
                    strategy.describe()
                );
            }
            match strategy.lookup(host).await {
                Ok(addrs) => {
                    let Some(addr) = addrs.first().copied() else {
                        continue;
                    };
                    if index == 0 {
                        tracing::debug!("Resolved {} to {} with {}", host, addr, strategy.describe());
                        return Resolution::AsGiven(host.to_string());
                    }
                    println!("Found IP: {addr}");
                    return Resolution::ViaFallback(addr);
                }
                Err(LookupFailure::NoSuchDomain) => {
                    tracing::debug!("{} does not exist according to {}", host, strategy.describe());
                }
                Err(LookupFailure::Failed(reason)) => {
                    tracing::warn!(
                        "Lookup of {} with {} failed: {}",
                        host,
                        strategy.describe(),
                        reason
                    );
                }
            }
        }
        println!("No IP found for {host}");
        Resolution::Unresolved
    }

    /// Like [`resolve`](Self::resolve) but maps `Unresolved` to an error.
    pub async fn resolve_target(&self, host: &str) -> Result<String> {
        self.resolve(host).await.target().ok_or_else(|| Error::Resolution {
            host: host.to_string(),
        })
    }
}

impl fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<String> = self.strategies.iter().map(|s| s.describe()).collect();
        f.debug_struct("HostResolver")
            .field("strategies", &strategies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        answer: std::result::Result<Vec<IpAddr>, LookupFailure>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResolverStrategy for Scripted {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn lookup(&self, _host: &str) -> std::result::Result<Vec<IpAddr>, LookupFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn scripted(
        answer: std::result::Result<Vec<IpAddr>, LookupFailure>,
    ) -> (Box<dyn ResolverStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                answer,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_first_strategy_keeps_hostname() {
        let (first, first_calls) = scripted(Ok(vec!["10.0.0.1".parse().unwrap()]));
        let (second, second_calls) = scripted(Ok(vec!["10.0.0.2".parse().unwrap()]));
        let resolver = HostResolver::new(vec![first, second]);

        let result = resolver.resolve("login01.example.edu").await;
        assert_eq!(result, Resolution::AsGiven("login01.example.edu".to_string()));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_strategies_fail() {
        let (first, _) = scripted(Err(LookupFailure::NoSuchDomain));
        let (second, _) = scripted(Err(LookupFailure::Failed("timed out".to_string())));
        let resolver = HostResolver::new(vec![first, second]);

        assert_eq!(resolver.resolve("nowhere").await, Resolution::Unresolved);
        let err = resolver.resolve_target("nowhere").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_empty_answer_falls_through() {
        let (first, _) = scripted(Ok(vec![]));
        let (second, _) = scripted(Ok(vec!["10.0.0.2".parse().unwrap()]));
        let resolver = HostResolver::new(vec![first, second]);

        let target = resolver.resolve_target("host").await.unwrap();
        assert_eq!(target, "10.0.0.2");
    }

    #[test]
    fn test_with_fallback_groups_skips_empty_groups() {
        let groups = vec![
            vec!["134.174.17.6".parse().unwrap()],
            vec![],
            vec!["128.103.1.1".parse().unwrap()],
        ];
        let resolver = HostResolver::with_fallback_groups(&groups);
        assert_eq!(resolver.strategies.len(), 3);
    }
}
