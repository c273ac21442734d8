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

//! Node selection (C2): decides which node owns a host's pinned queue.
//!
//! The actual CAS lives in the store (`bind_host`); this crate only decides
//! *which* node to propose when no binding exists yet, and makes the whole
//! operation idempotent under concurrent callers for the same host.

pub mod policy;

use netpulse_common::error::{ErrorKind, NetpulseError, NetpulseResult};
use netpulse_store::model::NodeRecord;
use netpulse_store::traits::{JobStore, JobStoreRef};
pub use policy::{LeastLoad, LoadWeightedRandom, NodeSelector};
use tracing::debug;

/// Nodes are considered live candidates if their heartbeat is fresher than
/// this many milliseconds and they have spare pinned capacity. The store is
/// the source of truth for *whether* a node still exists at all (backends
/// expire stale node records outright); this is an additional freshness
/// margin the scheduler applies on top so a node that is a few seconds from
/// expiring is not handed new work.
const CANDIDATE_FRESHNESS_MS: i64 = 10_000;

pub struct Scheduler {
    store: JobStoreRef,
    selector: Box<dyn NodeSelector>,
}

impl Scheduler {
    pub fn new(store: JobStoreRef, selector: Box<dyn NodeSelector>) -> Self {
        Self { store, selector }
    }

    pub fn least_load(store: JobStoreRef) -> Self {
        Self::new(store, Box::new(LeastLoad))
    }

    pub fn load_weighted_random(store: JobStoreRef) -> Self {
        Self::new(store, Box::new(LoadWeightedRandom))
    }

    /// `choose_node(host) -> node_id | NoCapacity`. If `host` is already
    /// bound to a live node, that node is returned unchanged. Otherwise a
    /// node is selected and bound via the store's create-if-absent CAS; on
    /// conflict with a concurrent caller, the CAS winner is returned instead
    /// of the locally selected node, so repeated calls for the same host
    /// always converge on one node regardless of call order.
    pub async fn choose_node(&self, host: &str) -> NetpulseResult<String> {
        if let Some(existing) = self.store.get_host_node(host).await.map_err(NetpulseError::from)? {
            if let Some(node) = self.store.get_node(&existing).await.map_err(NetpulseError::from)? {
                if is_fresh(&node, netpulse_common::ids::now_ms()) {
                    return Ok(existing);
                }
            }
        }

        let now = netpulse_common::ids::now_ms();
        let candidates: Vec<NodeRecord> = self
            .store
            .list_nodes()
            .await
            .map_err(NetpulseError::from)?
            .into_iter()
            .filter(|n| is_fresh(n, now) && n.current_pinned_count < n.capacity)
            .collect();

        let picked = self
            .selector
            .select(&candidates)
            .ok_or(NetpulseError::NoCapacity)?;

        let winner = self.store.bind_host(host, &picked).await.map_err(NetpulseError::from)?;
        if winner != picked {
            debug!(host, picked = %picked, winner = %winner, "lost binding race, deferring to winner");
        }
        Ok(winner)
    }
}

fn is_fresh(node: &NodeRecord, now_ms: i64) -> bool {
    now_ms - node.last_heartbeat < CANDIDATE_FRESHNESS_MS
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netpulse_store::mem::new_mem_store;
    use netpulse_store::traits::HeartbeatFields;

    use super::*;

    async fn heartbeat(store: &JobStoreRef, node: &str, capacity: usize, used: usize) {
        store
            .heartbeat(
                node,
                HeartbeatFields {
                    hostname: node.to_string(),
                    pid: 1,
                    capacity,
                    current_pinned_count: used,
                },
                Duration::from_secs(30),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn choose_node_returns_existing_binding_unchanged() {
        let store: JobStoreRef = new_mem_store();
        heartbeat(&store, "node-a", 4, 0).await;
        heartbeat(&store, "node-b", 4, 0).await;
        store.bind_host("10.0.0.1", "node-b").await.unwrap();

        let scheduler = Scheduler::least_load(store);
        assert_eq!(scheduler.choose_node("10.0.0.1").await.unwrap(), "node-b");
    }

    #[tokio::test]
    async fn choose_node_selects_least_loaded() {
        let store: JobStoreRef = new_mem_store();
        heartbeat(&store, "node-a", 4, 3).await;
        heartbeat(&store, "node-b", 4, 1).await;

        let scheduler = Scheduler::least_load(store);
        assert_eq!(scheduler.choose_node("10.0.0.2").await.unwrap(), "node-b");
    }

    #[tokio::test]
    async fn choose_node_returns_no_capacity_when_all_full() {
        let store: JobStoreRef = new_mem_store();
        heartbeat(&store, "node-a", 2, 2).await;

        let scheduler = Scheduler::least_load(store);
        let err = scheduler.choose_node("10.0.0.3").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoCapacity);
    }

    #[tokio::test]
    async fn choose_node_is_idempotent_under_concurrent_calls() {
        use std::sync::Arc;

        let store: JobStoreRef = new_mem_store();
        heartbeat(&store, "node-a", 8, 0).await;
        heartbeat(&store, "node-b", 8, 0).await;

        let scheduler = Arc::new(Scheduler::least_load(store));
        let mut handles = vec![];
        for _ in 0..6 {
            let scheduler = Arc::clone(&scheduler);
            handles.push(tokio::spawn(async move { scheduler.choose_node("10.0.0.4").await.unwrap() }));
        }
        let mut winners = std::collections::HashSet::new();
        for h in handles {
            winners.insert(h.await.unwrap());
        }
        assert_eq!(winners.len(), 1);
    }
}
