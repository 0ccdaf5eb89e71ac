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

mod common;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{allocation_script, CountingCloser, ScriptedTransport, PASSWORD};
use jupyter_o2::config::{Config, Overrides, Settings};
use jupyter_o2::error::{Error, Result};
use jupyter_o2::resolver::{HostResolver, LookupFailure, ResolverStrategy};
use jupyter_o2::secret::{Credential, SecretStore};
use jupyter_o2::session::pattern::SET_SENTINEL_COMMAND;
use jupyter_o2::ssh::ConnectOptions;
use jupyter_o2::workflow::{CleanupContext, Connector, SessionOrchestrator};

struct FixedAnswer(Option<IpAddr>);

#[async_trait]
impl ResolverStrategy for FixedAnswer {
    fn describe(&self) -> String {
        "fixed".to_string()
    }

    async fn lookup(&self, _host: &str) -> std::result::Result<Vec<IpAddr>, LookupFailure> {
        self.0.map(|ip| vec![ip]).ok_or(LookupFailure::NoSuchDomain)
    }
}

fn resolver(found: bool) -> HostResolver {
    let answer = found.then(|| "10.11.12.13".parse().unwrap());
    HostResolver::new(vec![Box::new(FixedAnswer(answer))])
}

#[derive(Default)]
struct FakeConnector {
    transports: Mutex<VecDeque<ScriptedTransport>>,
    seen: Arc<Mutex<Vec<ConnectOptions>>>,
}

impl FakeConnector {
    fn with(transports: Vec<ScriptedTransport>) -> Self {
        Self {
            transports: Mutex::new(transports.into()),
            seen: Arc::default(),
        }
    }

    fn seen(&self) -> Arc<Mutex<Vec<ConnectOptions>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Transport = ScriptedTransport;

    async fn connect(&self, options: &ConnectOptions, secrets: &SecretStore) -> Result<ScriptedTransport> {
        assert!(secrets.is_live(), "connect needs the credential");
        self.seen.lock().unwrap().push(options.clone());
        self.transports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::SessionClosed)
    }
}

fn primary_script() -> ScriptedTransport {
    allocation_script()
        .on("py35", &["[PEXPECT]$ "])
        .on(
            "jupyter notebook --port=8887",
            &["[I NotebookApp] The Jupyter Notebook is running at:\r\n", " http://localhost:8887/?token=abc123\r\n"],
        )
}

fn tunnel_script() -> ScriptedTransport {
    ScriptedTransport::new()
        .initially("[js123@login01 ~]$ ")
        .on(SET_SENTINEL_COMMAND, &["[PEXPECT]$ "])
        .on("ssh -N -L 8887:127.0.0.1:8887 compute-e-16-175", &["js123@compute-e-16-175's password: "])
        .on_silent(PASSWORD, &["\r\n"])
}

fn settings() -> Settings {
    let overrides = Overrides {
        no_browser: true,
        ..Default::default()
    };
    Settings::resolve("js123", "notebook", Config::default(), overrides)
}

fn cleanup_with_password() -> Arc<CleanupContext> {
    let secrets = Arc::new(SecretStore::new());
    secrets.insert(Credential::new(PASSWORD).unwrap());
    CleanupContext::new(secrets)
}

#[tokio::test]
async fn test_prepare_runs_every_stage() {
    let primary = primary_script();
    let tunnel = tunnel_script();
    let closers: Vec<Arc<CountingCloser>> =
        vec![primary.counting_closer(), tunnel.counting_closer()];
    let cleanup = cleanup_with_password();
    let orchestrator = SessionOrchestrator::new(
        settings(),
        FakeConnector::with(vec![primary, tunnel]),
        resolver(true),
        Arc::clone(&cleanup),
    );

    let prepared = orchestrator.prepare().await.unwrap();

    assert_eq!(prepared.url, "http://localhost:8887/?token=abc123");
    assert_eq!(prepared.allocation.node, "compute-e-16-175");
    assert_eq!(prepared.allocation.login_host, "login01");
    // Scrubbed as soon as the tunnel no longer needs it.
    assert!(!cleanup.secrets().is_live());

    cleanup.run().await;
    for closer in &closers {
        assert_eq!(closer.count(), 1);
    }
    prepared.tunnel.abort();
}

#[tokio::test]
async fn test_prepare_connect_options() {
    let connector = FakeConnector::with(vec![primary_script(), tunnel_script()]);
    let seen = connector.seen();
    let cleanup = cleanup_with_password();
    let orchestrator =
        SessionOrchestrator::new(settings(), connector, resolver(true), Arc::clone(&cleanup));

    let prepared = orchestrator.prepare().await.unwrap();
    prepared.tunnel.abort();
    cleanup.run().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);

    let login = &seen[0];
    assert_eq!(login.host, "o2.hms.harvard.edu");
    assert_eq!(login.user, "js123");
    assert_eq!(login.port, 22);
    assert_eq!(login.local_forward, Some(8887));
    assert!(login.x11);
    assert_eq!(login.handshake_timeout, Duration::from_secs(60));

    let tunnel = &seen[1];
    assert_eq!(tunnel.host, "login01");
    assert_eq!(tunnel.local_forward, None);
    assert!(!tunnel.x11);
    assert_eq!(tunnel.handshake_timeout, Duration::from_secs(10));
}

#[tokio::test]
async fn test_unresolved_host_stops_before_connecting() {
    let connector = FakeConnector::with(vec![primary_script()]);
    let cleanup = cleanup_with_password();
    let orchestrator =
        SessionOrchestrator::new(settings(), connector, resolver(false), Arc::clone(&cleanup));

    let err = match orchestrator.prepare().await {
        Ok(_) => panic!("prepare should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, Error::Resolution { ref host } if host == "o2.hms.harvard.edu"));
    assert!(cleanup.secrets().is_live());
}

#[tokio::test]
async fn test_invalid_settings_fail_validation() {
    let mut settings = settings();
    settings.mem = "1G && reboot".to_string();
    let orchestrator = SessionOrchestrator::new(
        settings,
        FakeConnector::default(),
        resolver(true),
        cleanup_with_password(),
    );

    let err = match orchestrator.prepare().await {
        Ok(_) => panic!("prepare should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_default_timeouts() {
    let settings = settings();
    assert_eq!(settings.login_timeout, Duration::from_secs(60));
    assert_eq!(settings.tunnel_timeout, Duration::from_secs(10));
}
