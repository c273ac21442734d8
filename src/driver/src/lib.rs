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

//! Device-driver capability set (§6) and its concrete instances: a mock
//! driver for tests, an SSH-session driver built on `russh`, and a
//! pool-safe HTTP/RESTCONF-like driver built on `reqwest`. Also houses the
//! two small external-collaborator contracts the worker needs at the edges
//! of a job: [`credentials::CredentialProvider`] and [`render::RenderHook`].

pub mod credentials;
pub mod http;
pub mod mock;
pub mod registry;
pub mod render;
pub mod ssh;

use std::time::Duration;

use async_trait::async_trait;
use netpulse_common::error::NetpulseResult;
use netpulse_store::model::DeviceFingerprint;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// How a driver prefers to be scheduled absent an explicit client override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStrategy {
    Fifo,
    Pinned,
}

impl QueueStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStrategy::Fifo => "fifo",
            QueueStrategy::Pinned => "pinned",
        }
    }
}

/// A live, established connection to a device. Opaque to everything above
/// the driver layer; only the driver that produced it knows how to use it.
/// `Any` lets each concrete driver downcast its own session type back out
/// of the trait object the worker holds.
pub trait Session: std::any::Any + Send {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Capability set a device-driver plugin exposes. Re-expressed from the
/// source's duck-typed driver objects as a trait object with an explicit
/// attribute triple, per the driver-polymorphism redesign note.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable name this driver is registered under (e.g. `"mock"`, `"ssh"`).
    fn name(&self) -> &str;

    /// True if concurrent sessions to distinct devices may safely share one
    /// worker process (no per-connection blocking resources held open).
    /// `pool_safe` drivers still get a dedicated session per device; what
    /// this attribute relaxes is *which* queue is allowed to run them.
    fn pool_safe(&self) -> bool;

    fn default_queue_strategy(&self) -> QueueStrategy;

    fn keepalive_interval(&self) -> Duration;

    async fn connect(&self, device: &DeviceFingerprint, secret: &credentials::Secret) -> NetpulseResult<Box<dyn Session>>;

    async fn execute(
        &self,
        session: &mut dyn Session,
        commands: &[String],
    ) -> NetpulseResult<BTreeMap<String, JsonValue>>;

    async fn apply_config(&self, session: &mut dyn Session, lines: &[String]) -> NetpulseResult<BTreeMap<String, JsonValue>>;

    async fn disconnect(&self, session: Box<dyn Session>) -> NetpulseResult<()>;
}
