// Copyright 2026 NetPulse Contributors
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

//! A RESTCONF-like driver over plain HTTP(S). Pool-safe: `reqwest::Client`
//! is cheaply cloneable and has no per-device blocking state, so the
//! dispatcher is free to schedule its jobs onto the shared `fifo` queue
//! regardless of client-requested queue strategy.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use netpulse_common::error::{NetpulseError, NetpulseResult};
use netpulse_store::model::DeviceFingerprint;
use reqwest::Client;
use serde_json::Value as JsonValue;

use crate::credentials::Secret;
use crate::{Driver, QueueStrategy, Session};

pub struct HttpSession {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl Session for HttpSession {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct HttpDriver {
    client: Client,
}

impl HttpDriver {
    pub fn new() -> NetpulseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NetpulseError::Driver(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &str {
        "restconf"
    }

    fn pool_safe(&self) -> bool {
        true
    }

    fn default_queue_strategy(&self) -> QueueStrategy {
        QueueStrategy::Fifo
    }

    fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn connect(&self, device: &DeviceFingerprint, secret: &Secret) -> NetpulseResult<Box<dyn Session>> {
        let port = device.port.unwrap_or(443);
        let scheme = device
            .connection_args
            .get("scheme")
            .and_then(JsonValue::as_str)
            .unwrap_or("https");
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            base_url: format!("{scheme}://{}:{port}/restconf", device.host),
            username: secret.username.clone(),
            password: secret.password.clone(),
        }))
    }

    async fn execute(&self, session: &mut dyn Session, commands: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        let session = session
            .as_any_mut()
            .downcast_mut::<HttpSession>()
            .ok_or_else(|| NetpulseError::Driver("session type mismatch for restconf driver".into()))?;

        let mut out = BTreeMap::new();
        for path in commands {
            let url = format!("{}/{}", session.base_url, path.trim_start_matches('/'));
            let response = session
                .client
                .get(&url)
                .basic_auth(&session.username, Some(&session.password))
                .send()
                .await
                .map_err(|e| NetpulseError::Connection(format!("{url}: {e}")))?;
            if !response.status().is_success() {
                return Err(NetpulseError::Driver(format!("{url}: HTTP {}", response.status())));
            }
            let body: JsonValue = response
                .json()
                .await
                .map_err(|e| NetpulseError::Driver(format!("{url}: invalid JSON body: {e}")))?;
            out.insert(path.clone(), body);
        }
        Ok(out)
    }

    async fn apply_config(&self, session: &mut dyn Session, lines: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        let session = session
            .as_any_mut()
            .downcast_mut::<HttpSession>()
            .ok_or_else(|| NetpulseError::Driver("session type mismatch for restconf driver".into()))?;
        let body: JsonValue =
            serde_json::from_str(&lines.join("\n")).map_err(|e| NetpulseError::Validation(format!("config body must be JSON: {e}")))?;

        let url = format!("{}/data", session.base_url);
        let response = session
            .client
            .patch(&url)
            .basic_auth(&session.username, Some(&session.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| NetpulseError::Connection(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(NetpulseError::Driver(format!("{url}: HTTP {}", response.status())));
        }
        Ok(BTreeMap::from([("applied".to_string(), JsonValue::Bool(true))]))
    }

    async fn disconnect(&self, _session: Box<dyn Session>) -> NetpulseResult<()> {
        // Stateless transport; nothing to tear down beyond dropping the
        // cloned `reqwest::Client` handle.
        Ok(())
    }
}
