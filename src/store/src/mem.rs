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

//! In-process [`JobStore`] backend. Single-node only, but linearizable by
//! construction: every mutation happens under one write-lock acquisition, so
//! the CAS operations the trait promises (`bind_host`, `dequeue`) fall out
//! for free rather than needing a real compare-and-swap primitive.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netpulse_common::ids::now_ms;
use tokio::sync::{Notify, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::model::{Job, JobFilter, JobSelector, JobStatus, NodeRecord, WorkerRecord};
use crate::traits::{HeartbeatFields, JobStore, JobUpdate};

struct NodeEntry {
    record: NodeRecord,
    expire_at_ms: i64,
}

#[derive(Default)]
struct Core {
    jobs: HashMap<String, Job>,
    queues: HashMap<String, VecDeque<String>>,
    host_bindings: HashMap<String, String>,
    nodes: HashMap<String, NodeEntry>,
    workers: HashMap<String, WorkerRecord>,
}

pub struct MemStore {
    core: RwLock<Core>,
    /// Fired on every enqueue; dequeue waiters wake up and re-check their
    /// queue set rather than each queue owning its own waker.
    notify: Notify,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            core: RwLock::new(Core::default()),
            notify: Notify::new(),
        }
    }

    fn try_claim(core: &mut Core, queue_set: &[String]) -> Option<Job> {
        for queue in queue_set {
            if let Some(ids) = core.queues.get_mut(queue) {
                while let Some(id) = ids.pop_front() {
                    match core.jobs.get(&id) {
                        Some(job) if job.status == JobStatus::Queued => {
                            return core.jobs.get(&id).cloned();
                        }
                        // Job was cancelled/expired while queued; skip it.
                        _ => continue,
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl JobStore for MemStore {
    async fn enqueue(&self, queue: &str, job: Job) -> StoreResult<String> {
        let id = job.id.clone();
        let mut core = self.core.write().await;
        core.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(id.clone());
        core.jobs.insert(id.clone(), job);
        drop(core);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn dequeue(&self, queue_set: &[String], block_timeout: Duration) -> StoreResult<Option<Job>> {
        let deadline = tokio::time::Instant::now() + block_timeout;
        loop {
            {
                let mut core = self.core.write().await;
                if let Some(job) = Self::try_claim(&mut core, queue_set) {
                    return Ok(Some(job));
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<Job>> {
        Ok(self.core.read().await.jobs.get(id).cloned())
    }

    async fn set_status(&self, id: &str, status: JobStatus, fields: JobUpdate) -> StoreResult<()> {
        let mut core = self.core.write().await;
        let job = core.jobs.get_mut(id).ok_or(StoreError::NotFound)?;
        job.status = status;
        if let Some(v) = fields.started_at {
            job.started_at = Some(v);
        }
        if let Some(v) = fields.ended_at {
            job.ended_at = Some(v);
        }
        if let Some(v) = fields.result {
            job.result = Some(v);
        }
        if let Some(v) = fields.cancel_requested {
            job.cancel_requested = v;
        }
        if let Some(v) = fields.node_id {
            job.node_id = Some(v);
        }
        Ok(())
    }

    async fn list_jobs(&self, filter: JobFilter) -> StoreResult<Vec<Job>> {
        let core = self.core.read().await;
        Ok(core
            .jobs
            .values()
            .filter(|j| filter.id.as_deref().map_or(true, |v| v == j.id))
            .filter(|j| filter.queue.as_deref().map_or(true, |v| v == j.queue))
            .filter(|j| filter.status.map_or(true, |v| v == j.status))
            .filter(|j| filter.node.as_deref().map_or(true, |v| Some(v.to_string()) == j.node_id))
            .filter(|j| filter.host.as_deref().map_or(true, |v| v == j.device.host))
            .cloned()
            .collect())
    }

    async fn delete_job(&self, selector: JobSelector) -> StoreResult<()> {
        let mut core = self.core.write().await;
        match selector {
            JobSelector::Id(id) => Self::cancel_one(&mut core, &id),
            JobSelector::Queue(queue) => {
                let ids: Vec<String> = core
                    .jobs
                    .values()
                    .filter(|j| j.queue == queue)
                    .map(|j| j.id.clone())
                    .collect();
                for id in ids {
                    Self::cancel_one(&mut core, &id);
                }
            }
            JobSelector::Host(host) => {
                let ids: Vec<String> = core
                    .jobs
                    .values()
                    .filter(|j| j.device.host == host)
                    .map(|j| j.id.clone())
                    .collect();
                for id in ids {
                    Self::cancel_one(&mut core, &id);
                }
            }
        }
        Ok(())
    }

    async fn bind_host(&self, host: &str, node: &str) -> StoreResult<String> {
        let mut core = self.core.write().await;
        if let Some(existing) = core.host_bindings.get(host) {
            return Ok(existing.clone());
        }
        core.host_bindings.insert(host.to_string(), node.to_string());
        Ok(node.to_string())
    }

    async fn get_host_node(&self, host: &str) -> StoreResult<Option<String>> {
        Ok(self.core.read().await.host_bindings.get(host).cloned())
    }

    async fn unbind_host(&self, host: &str, node: &str) -> StoreResult<bool> {
        let mut core = self.core.write().await;
        if core.host_bindings.get(host).map(String::as_str) == Some(node) {
            core.host_bindings.remove(host);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_hosts_for_node(&self, node: &str) -> StoreResult<Vec<String>> {
        let core = self.core.read().await;
        Ok(core
            .host_bindings
            .iter()
            .filter(|(_, n)| n.as_str() == node)
            .map(|(h, _)| h.clone())
            .collect())
    }

    async fn list_bindings(&self) -> StoreResult<Vec<(String, String)>> {
        let core = self.core.read().await;
        Ok(core.host_bindings.iter().map(|(h, n)| (h.clone(), n.clone())).collect())
    }

    async fn heartbeat(&self, node: &str, fields: HeartbeatFields, ttl: Duration) -> StoreResult<()> {
        let mut core = self.core.write().await;
        let now = now_ms();
        let expire_at_ms = now + ttl.as_millis() as i64;
        let entry = core.nodes.entry(node.to_string()).or_insert_with(|| NodeEntry {
            record: NodeRecord {
                node_id: node.to_string(),
                hostname: fields.hostname.clone(),
                pid: fields.pid,
                capacity: fields.capacity,
                current_pinned_count: fields.current_pinned_count,
                last_heartbeat: now,
            },
            expire_at_ms,
        });
        entry.record.hostname = fields.hostname;
        entry.record.pid = fields.pid;
        entry.record.capacity = fields.capacity;
        entry.record.current_pinned_count = fields.current_pinned_count;
        entry.record.last_heartbeat = now;
        entry.expire_at_ms = expire_at_ms;
        Ok(())
    }

    async fn get_node(&self, node: &str) -> StoreResult<Option<NodeRecord>> {
        let core = self.core.read().await;
        let now = now_ms();
        Ok(core
            .nodes
            .get(node)
            .filter(|e| e.expire_at_ms >= now)
            .map(|e| e.record.clone()))
    }

    async fn list_nodes(&self) -> StoreResult<Vec<NodeRecord>> {
        let core = self.core.read().await;
        let now = now_ms();
        Ok(core
            .nodes
            .values()
            .filter(|e| e.expire_at_ms >= now)
            .map(|e| e.record.clone())
            .collect())
    }

    async fn expire_node(&self, node: &str) -> StoreResult<()> {
        self.core.write().await.nodes.remove(node);
        Ok(())
    }

    async fn upsert_worker(&self, worker: WorkerRecord) -> StoreResult<()> {
        self.core.write().await.workers.insert(worker.id.clone(), worker);
        Ok(())
    }

    async fn remove_worker(&self, id: &str) -> StoreResult<()> {
        self.core.write().await.workers.remove(id);
        Ok(())
    }

    async fn list_workers(&self) -> StoreResult<Vec<WorkerRecord>> {
        Ok(self.core.read().await.workers.values().cloned().collect())
    }

    async fn sweep(&self) -> StoreResult<()> {
        let mut core = self.core.write().await;
        let now = now_ms();

        let expired: Vec<(String, String)> = core
            .jobs
            .values()
            .filter(|j| j.queue_expired(now))
            .map(|j| (j.id.clone(), j.queue.clone()))
            .collect();
        for (id, queue) in &expired {
            if let Some(job) = core.jobs.get_mut(id) {
                job.status = JobStatus::Expired;
                job.ended_at = Some(now);
            }
            if let Some(ids) = core.queues.get_mut(queue) {
                ids.retain(|x| x != id);
            }
        }

        let gc_ids: Vec<String> = core
            .jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.result_expired(now))
            .map(|j| j.id.clone())
            .collect();
        for id in gc_ids {
            core.jobs.remove(&id);
        }

        core.nodes.retain(|_, e| e.expire_at_ms >= now);
        Ok(())
    }
}

impl MemStore {
    fn cancel_one(core: &mut Core, id: &str) {
        let Some(job) = core.jobs.get_mut(id) else {
            return;
        };
        match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Cancelled;
                job.ended_at = Some(now_ms());
                if let Some(ids) = core.queues.get_mut(&job.queue) {
                    ids.retain(|x| x != id);
                }
            }
            JobStatus::Running => {
                job.cancel_requested = true;
            }
            _ => {}
        }
    }
}

pub fn new_mem_store() -> Arc<MemStore> {
    Arc::new(MemStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_job;

    #[tokio::test]
    async fn enqueue_dequeue_round_trip() {
        let store = MemStore::new();
        let job = sample_job("10.0.0.1", "pinned_10.0.0.1");
        let id = job.id.clone();
        store.enqueue("pinned_10.0.0.1", job).await.unwrap();

        let claimed = store
            .dequeue(&["pinned_10.0.0.1".to_string()], Duration::from_millis(50))
            .await
            .unwrap()
            .expect("job present");
        assert_eq!(claimed.id, id);

        // Queue now empty: a second dequeue should time out with `None`.
        let empty = store
            .dequeue(&["pinned_10.0.0.1".to_string()], Duration::from_millis(20))
            .await
            .unwrap();
        assert!(empty.is_none());
    }

    #[tokio::test]
    async fn fifo_order_per_queue() {
        let store = MemStore::new();
        for cmd in ["A", "B", "C"] {
            let mut job = sample_job("10.0.0.1", "pinned_10.0.0.1");
            job.payload = crate::model::Payload::Command(cmd.to_string());
            store.enqueue("pinned_10.0.0.1", job).await.unwrap();
        }
        let mut seen = vec![];
        while let Some(job) = store
            .dequeue(&["pinned_10.0.0.1".to_string()], Duration::from_millis(10))
            .await
            .unwrap()
        {
            if let crate::model::Payload::Command(c) = job.payload {
                seen.push(c);
            }
        }
        assert_eq!(seen, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn bind_host_is_idempotent_under_cas() {
        let store = MemStore::new();
        let first = store.bind_host("10.0.0.1", "node-a").await.unwrap();
        let second = store.bind_host("10.0.0.1", "node-b").await.unwrap();
        assert_eq!(first, "node-a");
        assert_eq!(second, "node-a");
    }

    #[tokio::test]
    async fn unbind_host_is_conditional() {
        let store = MemStore::new();
        store.bind_host("10.0.0.1", "node-a").await.unwrap();
        assert!(!store.unbind_host("10.0.0.1", "node-b").await.unwrap());
        assert!(store.unbind_host("10.0.0.1", "node-a").await.unwrap());
        assert_eq!(store.get_host_node("10.0.0.1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn node_heartbeat_expiry() {
        let store = MemStore::new();
        store
            .heartbeat(
                "node-a",
                HeartbeatFields {
                    hostname: "h1".into(),
                    pid: 1,
                    capacity: 4,
                    current_pinned_count: 0,
                },
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(store.get_node("node-a").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_node("node-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_queued_job_is_atomic() {
        let store = MemStore::new();
        let job = sample_job("10.0.0.1", "pinned_10.0.0.1");
        let id = job.id.clone();
        store.enqueue("pinned_10.0.0.1", job).await.unwrap();

        store.delete_job(JobSelector::Id(id.clone())).await.unwrap();

        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(store
            .dequeue(&["pinned_10.0.0.1".to_string()], Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cancel_running_job_sets_marker_not_status() {
        let store = MemStore::new();
        let job = sample_job("10.0.0.1", "pinned_10.0.0.1");
        let id = job.id.clone();
        store.enqueue("pinned_10.0.0.1", job).await.unwrap();
        store
            .dequeue(&["pinned_10.0.0.1".to_string()], Duration::from_millis(10))
            .await
            .unwrap();
        store
            .set_status(&id, JobStatus::Running, JobUpdate::default())
            .await
            .unwrap();

        store.delete_job(JobSelector::Id(id.clone())).await.unwrap();

        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.cancel_requested);
    }

    #[tokio::test]
    async fn result_ttl_garbage_collects_after_retention() {
        let store = MemStore::new();
        let mut job = sample_job("10.0.0.1", "fifo");
        job.result_retention_secs = 0;
        let id = job.id.clone();
        store.enqueue("fifo", job).await.unwrap();
        store
            .set_status(
                &id,
                JobStatus::Finished,
                JobUpdate {
                    ended_at: Some(now_ms() - 1000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.sweep().await.unwrap();
        assert!(store.get_job(&id).await.unwrap().is_none());
    }
}
