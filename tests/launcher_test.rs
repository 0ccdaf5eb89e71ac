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

use std::time::Duration;

use common::{ScriptedTransport, SharedBuf};
use jupyter_o2::session::PatternSession;
use jupyter_o2::workflow::{ServiceLauncher, ServiceRequest};

fn at_sentinel(script: ScriptedTransport) -> ScriptedTransport {
    script.on("source activate py35", &["[PEXPECT]$ "])
}

#[tokio::test]
async fn test_launch_extracts_url() {
    let transport = at_sentinel(ScriptedTransport::new()).on(
        "jupyter notebook",
        &[
            "[I 10:01:02.345 NotebookApp] Serving notebooks from local directory: /home/js123\r\n",
            "... blah https://localhost:8887/?token=abc123 blah ...\r\n",
        ],
    );
    let recorded = transport.recorded();
    let mirror = SharedBuf::default();
    let mut session = PatternSession::new(transport, "login_ssh", Duration::from_secs(5))
        .with_mirror(mirror.clone());
    let request = ServiceRequest::new("notebook", 8887, "source activate py35").unwrap();

    let url = ServiceLauncher::new(&request).launch(&mut session).await.unwrap();

    assert_eq!(url, "https://localhost:8887/?token=abc123");
    let written = recorded.lock().unwrap().written_text();
    assert_eq!(
        written,
        "source activate py35\njupyter notebook --port=8887 --browser='none'\n"
    );
    // Service startup output is shown to the user.
    assert!(mirror.text().contains("Serving notebooks"));
}

#[tokio::test]
async fn test_launch_url_split_across_chunks() {
    let transport = at_sentinel(ScriptedTransport::new()).on(
        "jupyter lab",
        &[
            "    Or copy and paste one of these URLs:\r\n        http://local",
            "host:9000/?token=0f1e2d3c\r\n",
        ],
    );
    let mut session = PatternSession::new(transport, "login_ssh", Duration::from_secs(5))
        .with_mirror(SharedBuf::default());
    let request = ServiceRequest::new("lab", 9000, "source activate py35").unwrap();

    let url = ServiceLauncher::new(&request).launch(&mut session).await.unwrap();
    assert_eq!(url, "http://localhost:9000/?token=0f1e2d3c");
}

#[tokio::test]
async fn test_launch_ignores_other_ports() {
    let transport = at_sentinel(ScriptedTransport::new()).on(
        "jupyter notebook",
        &["The port 8887 is already in use, trying another port.\r\n http://localhost:8888/?token=abc \r\n"],
    );
    let mut session = PatternSession::new(transport, "login_ssh", Duration::from_millis(200))
        .with_mirror(SharedBuf::default());
    let request = ServiceRequest::new("notebook", 8887, "source activate py35").unwrap();

    let err = ServiceLauncher::new(&request).launch(&mut session).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("service URL"));
}

#[tokio::test]
async fn test_launch_without_activation_line() {
    let transport = ScriptedTransport::new().on(
        "jupyter notebook",
        &["\r\n https://localhost:8887/?token=ff00\r\n"],
    );
    let recorded = transport.recorded();
    let mut session = PatternSession::new(transport, "login_ssh", Duration::from_secs(5))
        .with_mirror(SharedBuf::default());
    let request = ServiceRequest::new("notebook", 8887, "").unwrap();

    let url = ServiceLauncher::new(&request).launch(&mut session).await.unwrap();
    assert_eq!(url, "https://localhost:8887/?token=ff00");
    assert!(recorded.lock().unwrap().written_text().starts_with("jupyter notebook"));
}
