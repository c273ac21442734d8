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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Job, JobFilter, JobSelector, JobStatus, NodeRecord, WorkerRecord};

/// A partial update applied by `set_status`. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub result: Option<crate::model::JobResult>,
    pub cancel_requested: Option<bool>,
    pub node_id: Option<String>,
}

/// Fields refreshed by a node heartbeat.
#[derive(Debug, Clone)]
pub struct HeartbeatFields {
    pub hostname: String,
    pub pid: u32,
    pub capacity: usize,
    pub current_pinned_count: usize,
}

/// The durable-enough backend behind the job queues and the cluster
/// metadata maps (host→node bindings, node heartbeats, worker inventory).
///
/// Any backend implementing this contract can serve: an in-process
/// [`crate::mem::MemStore`] for tests and single-node deployments, or a
/// networked [`crate::redis::RedisStore`] for a real deployment. Callers
/// never match on which backend is behind the trait object.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append `job` to `queue`. FIFO per queue.
    async fn enqueue(&self, queue: &str, job: Job) -> StoreResult<String>;

    /// Atomically pop the earliest job across `queue_set`, blocking up to
    /// `block_timeout` if all queues are empty. At most one caller can ever
    /// claim a given job.
    async fn dequeue(&self, queue_set: &[String], block_timeout: Duration) -> StoreResult<Option<Job>>;

    async fn get_job(&self, id: &str) -> StoreResult<Option<Job>>;

    async fn set_status(&self, id: &str, status: JobStatus, fields: JobUpdate) -> StoreResult<()>;

    async fn list_jobs(&self, filter: JobFilter) -> StoreResult<Vec<Job>>;

    /// Cancellation: removes the job from its queue if still queued; marks
    /// it `cancelled` (queued) or sets the cancel-requested flag (running)
    /// so the worker observes it at its next checkpoint.
    async fn delete_job(&self, selector: JobSelector) -> StoreResult<()>;

    /// Create-if-absent CAS: returns the node now bound to `host`, which is
    /// `node` itself only if no binding previously existed.
    async fn bind_host(&self, host: &str, node: &str) -> StoreResult<String>;

    async fn get_host_node(&self, host: &str) -> StoreResult<Option<String>>;

    /// Conditional delete: removes the binding only if it still points at
    /// `node`. Returns whether the binding was removed.
    async fn unbind_host(&self, host: &str, node: &str) -> StoreResult<bool>;

    async fn list_hosts_for_node(&self, node: &str) -> StoreResult<Vec<String>>;

    /// Every host→node binding currently recorded, regardless of which node
    /// it names. Used to reclaim bindings left by a node a caller never
    /// personally observed alive — `list_hosts_for_node` can't help there
    /// since it requires already knowing the node id to look for.
    async fn list_bindings(&self) -> StoreResult<Vec<(String, String)>>;

    async fn heartbeat(&self, node: &str, fields: HeartbeatFields, ttl: Duration) -> StoreResult<()>;

    async fn get_node(&self, node: &str) -> StoreResult<Option<NodeRecord>>;

    async fn list_nodes(&self) -> StoreResult<Vec<NodeRecord>>;

    /// Force-removes a node record (used when reclaiming an orphan whose
    /// heartbeat has already lapsed).
    async fn expire_node(&self, node: &str) -> StoreResult<()>;

    async fn upsert_worker(&self, worker: WorkerRecord) -> StoreResult<()>;

    async fn remove_worker(&self, id: &str) -> StoreResult<()>;

    async fn list_workers(&self) -> StoreResult<Vec<WorkerRecord>>;

    /// Sweep queued jobs past their TTL into `expired` and drop job records
    /// whose result-retention window has elapsed. Backends with native TTL
    /// support (Redis) may make this a no-op and rely on key expiry instead.
    async fn sweep(&self) -> StoreResult<()>;
}

pub type JobStoreRef = Arc<dyn JobStore>;
