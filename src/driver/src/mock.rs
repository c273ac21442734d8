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

//! A driver with no real transport, for tests and local demos. Pinned by
//! default so the worker/supervisor pinned-path is exercisable without a
//! live device.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netpulse_common::error::NetpulseResult;
use netpulse_store::model::DeviceFingerprint;
use serde_json::Value as JsonValue;

use crate::credentials::Secret;
use crate::{Driver, QueueStrategy, Session};

pub struct MockSession {
    pub host: String,
}

impl Session for MockSession {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `connects` counts `connect()` calls; tests use it to assert on whether a
/// session was actually reused or reopened.
#[derive(Default)]
pub struct MockDriver {
    connects: Arc<AtomicUsize>,
}

impl MockDriver {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn pool_safe(&self) -> bool {
        false
    }

    fn default_queue_strategy(&self) -> QueueStrategy {
        QueueStrategy::Pinned
    }

    fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn connect(&self, device: &DeviceFingerprint, _secret: &Secret) -> NetpulseResult<Box<dyn Session>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession { host: device.host.clone() }))
    }

    async fn execute(&self, session: &mut dyn Session, commands: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        let session = session.as_any_mut().downcast_mut::<MockSession>().expect("mock driver always produces MockSession");
        let mut out = BTreeMap::new();
        for cmd in commands {
            out.insert(cmd.clone(), JsonValue::String(format!("{}: ok on {}", cmd, session.host)));
        }
        Ok(out)
    }

    async fn apply_config(&self, session: &mut dyn Session, lines: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        let session = session.as_any_mut().downcast_mut::<MockSession>().expect("mock driver always produces MockSession");
        Ok(BTreeMap::from([(
            "applied".to_string(),
            JsonValue::String(format!("{} line(s) applied on {}", lines.len(), session.host)),
        )]))
    }

    async fn disconnect(&self, _session: Box<dyn Session>) -> NetpulseResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executes_commands_against_a_mock_session() {
        let driver = MockDriver::default();
        let device = DeviceFingerprint {
            host: "10.0.0.1".to_string(),
            port: None,
            driver: "mock".to_string(),
            connection_args: JsonValue::Null,
            credential_ref: None,
        };
        let mut session = driver.connect(&device, &Secret::default()).await.unwrap();
        let out = driver.execute(session.as_mut(), &["show version".to_string()]).await.unwrap();
        assert_eq!(out["show version"], JsonValue::String("show version: ok on 10.0.0.1".to_string()));
        driver.disconnect(session).await.unwrap();
    }
}
