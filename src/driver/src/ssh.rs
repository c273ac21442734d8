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

//! A Netmiko-like interactive-SSH driver, built on `russh` rather than
//! shelling out. Not pool-safe: a session is a single exec channel over a
//! single TCP connection, held open for the worker's lifetime on that
//! device (mirrors how Netmiko keeps a persistent shell per device).

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netpulse_common::error::{NetpulseError, NetpulseResult};
use netpulse_store::model::DeviceFingerprint;
use russh::client::{self, Handle};
use serde_json::Value as JsonValue;

use crate::credentials::Secret;
use crate::{Driver, QueueStrategy, Session};

struct NoHostKeyCheck;

#[async_trait]
impl client::Handler for NoHostKeyCheck {
    type Error = russh::Error;

    /// Host-key pinning is a deployment concern (`known_hosts`-equivalent);
    /// left to a future credential/inventory integration.
    async fn check_server_key(&mut self, _key: &russh_keys::key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshSession {
    host: String,
    handle: Handle<NoHostKeyCheck>,
}

impl Session for SshSession {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl SshSession {
    async fn exec(&mut self, command: &str) -> NetpulseResult<String> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| NetpulseError::Connection(format!("{}: channel open failed: {e}", self.host)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| NetpulseError::Driver(format!("{}: exec failed: {e}", self.host)))?;

        let mut output = Vec::new();
        loop {
            let Some(msg) = channel.wait().await else { break };
            match msg {
                russh::ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                russh::ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                    return Err(NetpulseError::Driver(format!(
                        "{}: command '{command}' exited with status {exit_status}",
                        self.host
                    )));
                }
                russh::ChannelMsg::Eof | russh::ChannelMsg::Close => break,
                _ => {}
            }
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

pub struct SshDriver {
    keepalive: Duration,
}

impl SshDriver {
    pub fn new(keepalive: Duration) -> Self {
        Self { keepalive }
    }
}

impl Default for SshDriver {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Driver for SshDriver {
    fn name(&self) -> &str {
        "ssh"
    }

    fn pool_safe(&self) -> bool {
        false
    }

    fn default_queue_strategy(&self) -> QueueStrategy {
        QueueStrategy::Pinned
    }

    fn keepalive_interval(&self) -> Duration {
        self.keepalive
    }

    async fn connect(&self, device: &DeviceFingerprint, secret: &Secret) -> NetpulseResult<Box<dyn Session>> {
        let config = Arc::new(client::Config {
            keepalive_interval: Some(self.keepalive),
            ..Default::default()
        });
        let port = device.port.unwrap_or(22);
        let addr = (device.host.as_str(), port);
        let mut handle = client::connect(config, addr, NoHostKeyCheck)
            .await
            .map_err(|e| NetpulseError::Connection(format!("{}: {e}", device.host)))?;

        let authenticated = handle
            .authenticate_password(&secret.username, &secret.password)
            .await
            .map_err(|e| NetpulseError::Authentication(format!("{}: {e}", device.host)))?;
        if !authenticated {
            return Err(NetpulseError::Authentication(format!("{}: password rejected", device.host)));
        }

        Ok(Box::new(SshSession {
            host: device.host.clone(),
            handle,
        }))
    }

    async fn execute(&self, session: &mut dyn Session, commands: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        let session = session
            .as_any_mut()
            .downcast_mut::<SshSession>()
            .ok_or_else(|| NetpulseError::Driver("session type mismatch for ssh driver".into()))?;
        let mut out = BTreeMap::new();
        for command in commands {
            let output = session.exec(command).await?;
            out.insert(command.clone(), JsonValue::String(output));
        }
        Ok(out)
    }

    async fn apply_config(&self, session: &mut dyn Session, lines: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>> {
        // No structured config-mode modeling; each line is exec'd in turn,
        // matching Netmiko's `send_config_set` at its simplest.
        let results = self.execute(session, lines).await?;
        Ok(BTreeMap::from([(
            "applied".to_string(),
            JsonValue::Object(results.into_iter().map(|(k, v)| (k, v)).collect()),
        )]))
    }

    async fn disconnect(&self, session: Box<dyn Session>) -> NetpulseResult<()> {
        let mut session = session;
        let session = session
            .as_any_mut()
            .downcast_mut::<SshSession>()
            .ok_or_else(|| NetpulseError::Driver("session type mismatch for ssh driver".into()))?;
        session
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(|e| NetpulseError::Connection(format!("{}: disconnect failed: {e}", session.host)))?;
        Ok(())
    }
}
