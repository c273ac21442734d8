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

//! Request bodies accepted at the HTTP boundary and their normalization
//! into the canonical [`netpulse_dispatcher`]/[`netpulse_store`] shapes.
//!
//! Request bodies are heterogeneous the way the source's duck-typed bodies
//! are (`command` as a string or a list; `config` as text, a list, or a
//! template-context mapping). Per the driver-polymorphism/dynamic-payload
//! redesign notes, each is modeled here as a tagged variant with an
//! explicit discriminant, then normalized to `netpulse_store::model::Payload`
//! before it ever reaches the dispatcher.

use netpulse_common::error::{NetpulseError, NetpulseResult};
use netpulse_dispatcher::QueueStrategyOverride;
use netpulse_store::model::{DeviceFingerprint, OperationKind, Payload};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommandField {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigField {
    Text(String),
    Lines(Vec<String>),
    /// `{"template": "...", "context": {...}}`, rendered by the worker.
    Context(JsonValue),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RequestOptions {
    pub queue_strategy: Option<String>,
    pub ttl_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl RequestOptions {
    pub fn strategy_override(&self) -> NetpulseResult<QueueStrategyOverride> {
        match self.queue_strategy.as_deref() {
            None => Ok(QueueStrategyOverride::Unset),
            Some("fifo") => Ok(QueueStrategyOverride::Fifo),
            Some("pinned") => Ok(QueueStrategyOverride::Pinned),
            Some(other) => Err(NetpulseError::Validation(format!("unknown queue_strategy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub connection_args: JsonValue,
    #[serde(default)]
    pub credential_ref: Option<String>,
}

impl DeviceSpec {
    pub fn into_fingerprint(self, driver: &str) -> DeviceFingerprint {
        DeviceFingerprint {
            host: self.host,
            port: self.port,
            driver: driver.to_string(),
            connection_args: self.connection_args,
            credential_ref: self.credential_ref,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequestBody {
    pub driver: String,
    #[serde(flatten)]
    pub device: DeviceSpec,
    #[serde(default)]
    pub command: Option<CommandField>,
    #[serde(default)]
    pub config: Option<ConfigField>,
    #[serde(default)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkRequestBody {
    pub driver: String,
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub command: Option<CommandField>,
    #[serde(default)]
    pub config: Option<ConfigField>,
    #[serde(default)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestConnectionRequestBody {
    pub driver: String,
    #[serde(flatten)]
    pub device: DeviceSpec,
}

/// The dispatcher-local "command and config are mutually exclusive"
/// invariant (spec.md §4.3), enforced here before either ever becomes a
/// [`Payload`].
pub fn normalize_payload(command: Option<CommandField>, config: Option<ConfigField>) -> NetpulseResult<(OperationKind, Payload)> {
    match (command, config) {
        (Some(_), Some(_)) => Err(NetpulseError::Validation("command and config are mutually exclusive".into())),
        (None, None) => Err(NetpulseError::Validation("request must include a command or a config payload".into())),
        (Some(CommandField::Single(command)), None) => Ok((OperationKind::Execute, Payload::Command(command))),
        (Some(CommandField::Multiple(commands)), None) => Ok((OperationKind::Execute, Payload::Commands(commands))),
        (None, Some(ConfigField::Text(text))) => Ok((OperationKind::Push, Payload::ConfigText(text))),
        (None, Some(ConfigField::Lines(lines))) => Ok((OperationKind::Push, Payload::ConfigLines(lines))),
        (None, Some(ConfigField::Context(context))) => Ok((OperationKind::Push, Payload::ConfigContext(context))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_command_and_config_together() {
        let err = normalize_payload(Some(CommandField::Single("x".into())), Some(ConfigField::Text("y".into()))).unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }

    #[test]
    fn rejects_neither_command_nor_config() {
        let err = normalize_payload(None, None).unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }

    #[test]
    fn single_command_becomes_execute() {
        let (op, payload) = normalize_payload(Some(CommandField::Single("show version".into())), None).unwrap();
        assert_eq!(op, OperationKind::Execute);
        assert!(matches!(payload, Payload::Command(_)));
    }

    #[test]
    fn config_lines_become_push() {
        let (op, payload) = normalize_payload(None, Some(ConfigField::Lines(vec!["a".into()]))).unwrap();
        assert_eq!(op, OperationKind::Push);
        assert!(matches!(payload, Payload::ConfigLines(_)));
    }
}
