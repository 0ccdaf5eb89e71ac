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

use std::sync::Arc;

use common::{ScriptedTransport, PASSWORD};
use jupyter_o2::secret::{Credential, SecretStore};
use jupyter_o2::session::TransportCloser;
use jupyter_o2::workflow::CleanupContext;

#[tokio::test]
async fn test_duplicate_cleanup_closes_each_session_once() {
    let secrets = Arc::new(SecretStore::new());
    secrets.insert(Credential::new(PASSWORD).unwrap());
    let context = CleanupContext::new(Arc::clone(&secrets));

    let primary = ScriptedTransport::new();
    let tunnel = ScriptedTransport::new();
    let primary_closer = primary.counting_closer();
    let tunnel_closer = tunnel.counting_closer();
    context.register_session("login_ssh", primary_closer.clone());
    context.register_session("second_ssh", tunnel_closer.clone());

    context.run().await;
    context.run().await;

    assert_eq!(primary_closer.count(), 1);
    assert_eq!(tunnel_closer.count(), 1);
    assert!(primary_closer.is_closed());
    assert!(!secrets.is_live());
}

#[tokio::test]
async fn test_cleanup_before_any_session() {
    let secrets = Arc::new(SecretStore::new());
    let context = CleanupContext::new(Arc::clone(&secrets));

    context.run().await;
    assert!(context.has_run());
    assert!(!secrets.is_live());
}

#[tokio::test]
async fn test_concurrent_cleanup_runs_once() {
    let secrets = Arc::new(SecretStore::new());
    secrets.insert(Credential::new(PASSWORD).unwrap());
    let context = CleanupContext::new(Arc::clone(&secrets));
    let transport = ScriptedTransport::new();
    let closer = transport.counting_closer();
    context.register_session("login_ssh", closer.clone());

    let a = tokio::spawn({
        let context = Arc::clone(&context);
        async move { context.run().await }
    });
    let b = tokio::spawn({
        let context = Arc::clone(&context);
        async move { context.run().await }
    });
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(closer.count(), 1);
}
