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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jupyter_o2::error::Error;
use jupyter_o2::resolver::{HostResolver, LookupFailure, Resolution, ResolverStrategy};

struct Scripted {
    name: &'static str,
    answer: Result<Vec<IpAddr>, LookupFailure>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn boxed(
        name: &'static str,
        answer: Result<Vec<IpAddr>, LookupFailure>,
    ) -> (Box<dyn ResolverStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = Box::new(Self {
            name,
            answer,
            calls: Arc::clone(&calls),
        });
        (strategy, calls)
    }
}

#[async_trait]
impl ResolverStrategy for Scripted {
    fn describe(&self) -> String {
        self.name.to_string()
    }

    async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, LookupFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

#[tokio::test]
async fn test_third_configuration_wins_and_fourth_is_untouched() {
    let address: IpAddr = "134.174.159.22".parse().unwrap();
    let (system, system_calls) = Scripted::boxed("system", Err(LookupFailure::NoSuchDomain));
    let (hms, hms_calls) = Scripted::boxed("hms", Err(LookupFailure::NoSuchDomain));
    let (hu, hu_calls) = Scripted::boxed("hu", Ok(vec![address]));
    let (spare, spare_calls) = Scripted::boxed("spare", Ok(vec!["10.0.0.1".parse().unwrap()]));
    let resolver = HostResolver::new(vec![system, hms, hu, spare]);

    let resolution = resolver.resolve("login01").await;

    assert_eq!(resolution, Resolution::ViaFallback(address));
    assert_eq!(system_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hms_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hu_calls.load(Ordering::SeqCst), 1);
    assert_eq!(spare_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_system_answer_keeps_hostname() {
    let (system, _) = Scripted::boxed("system", Ok(vec!["10.1.2.3".parse().unwrap()]));
    let (fallback, fallback_calls) = Scripted::boxed("fallback", Ok(vec!["10.9.9.9".parse().unwrap()]));
    let resolver = HostResolver::new(vec![system, fallback]);

    let resolution = resolver.resolve("o2.hms.harvard.edu").await;
    assert_eq!(resolution, Resolution::AsGiven("o2.hms.harvard.edu".to_string()));
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unresolved_is_a_resolution_error() {
    let (system, _) = Scripted::boxed("system", Err(LookupFailure::NoSuchDomain));
    let (flaky, _) = Scripted::boxed("flaky", Err(LookupFailure::Failed("timed out".to_string())));
    let (empty, _) = Scripted::boxed("empty", Ok(Vec::new()));
    let resolver = HostResolver::new(vec![system, flaky, empty]);

    assert_eq!(resolver.resolve("nowhere").await, Resolution::Unresolved);
    let err = resolver.resolve_target("nowhere").await.unwrap_err();
    assert!(matches!(err, Error::Resolution { ref host } if host == "nowhere"));
}
