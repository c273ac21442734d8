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

//! The data model shared by every backend: [`Job`], [`NodeRecord`],
//! [`WorkerRecord`], and the host→node binding (modeled as a plain string
//! value, so it needs no dedicated type).

use std::collections::BTreeMap;

use netpulse_common::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// A device operation request, normalized to a canonical shape before
/// enqueue (tagged variant, not the duck-typed body the HTTP layer accepts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Execute,
    Push,
    TestConnection,
}

/// Command/config payload. Request bodies are heterogeneous (string, list,
/// or template-context mapping); this is the canonical internal shape the
/// dispatcher normalizes every request into before it ever touches a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Command(String),
    Commands(Vec<String>),
    ConfigLines(Vec<String>),
    ConfigText(String),
    /// A template-rendering context; the external renderer turns this into
    /// `ConfigText` before the driver ever sees it.
    ConfigContext(serde_json::Value),
}

/// Identifies a device and how to reach it. Either `connection_args` is
/// populated inline, or `credential_ref` names a secret the worker resolves
/// via the external credential provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub host: String,
    pub port: Option<u16>,
    pub driver: String,
    #[serde(default)]
    pub connection_args: serde_json::Value,
    #[serde(default)]
    pub credential_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
    Stopped,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::Stopped
                | JobStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Stopped => "stopped",
            JobStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    /// Command -> output, populated on success.
    #[serde(default)]
    pub retval: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<JobError>,
    /// Populated for `test-connection`: measured connect latency.
    #[serde(default)]
    pub connection_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub driver: String,
    pub operation: OperationKind,
    pub device: DeviceFingerprint,
    pub payload: Payload,
    pub queue: String,
    pub status: JobStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    /// Seconds a job may sit unclaimed before it expires.
    pub ttl_secs: u64,
    /// Seconds a job may run once claimed before it is killed.
    pub timeout_secs: u64,
    /// Seconds a finished job's result stays readable after `ended_at`.
    pub result_retention_secs: u64,
    pub result: Option<JobResult>,
    /// Best-effort cancellation marker the worker polls at checkpoints.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Which node's worker is (or should be) executing this job, if pinned.
    #[serde(default)]
    pub node_id: Option<String>,
}

impl Job {
    /// True once `ended_at + result_retention_secs` has elapsed.
    pub fn result_expired(&self, now_ms: i64) -> bool {
        match self.ended_at {
            Some(ended_at) => now_ms > ended_at + (self.result_retention_secs as i64) * 1000,
            None => false,
        }
    }

    /// True once the job has aged past its queue TTL without being claimed.
    pub fn queue_expired(&self, now_ms: i64) -> bool {
        self.status == JobStatus::Queued && now_ms > self.created_at + (self.ttl_secs as i64) * 1000
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub hostname: String,
    pub pid: u32,
    pub capacity: usize,
    pub current_pinned_count: usize,
    /// Milliseconds since epoch, refreshed by each heartbeat; backends are
    /// expected to apply their own freshness/TTL mechanism rather than have
    /// callers diff this against their own clock (see module docs).
    pub last_heartbeat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Pinned,
    Fifo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    pub kind: WorkerKind,
    pub queues: Vec<String>,
    pub node_id: String,
    pub last_seen: i64,
}

/// Filter accepted by `list_jobs`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub id: Option<String>,
    pub queue: Option<String>,
    pub status: Option<JobStatus>,
    pub node: Option<String>,
    pub host: Option<String>,
}

/// Selector accepted by `delete_job` / `cancel`.
#[derive(Debug, Clone)]
pub enum JobSelector {
    Id(String),
    Queue(String),
    Host(String),
}
