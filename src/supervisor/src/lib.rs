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

//! Node supervisor (C4): registers a node, keeps its heartbeat fresh, and
//! owns the population of pinned and FIFO workers running on it. Modeled
//! after the heartbeat-checker shape common in this codebase's cluster
//! managers — a `select!` loop racing a tick interval against a shutdown
//! signal — generalized here to also drive a reconcile pass over bindings.

mod reconcile;
mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use netpulse_common::error::NetpulseResult;
use netpulse_store::traits::{HeartbeatFields, JobStore, JobStoreRef};
use netpulse_worker::{run_fifo_worker, WorkerContext, WorkerHandle};
use tokio::sync::{oneshot, RwLock};
pub use state::NodeState;
use tracing::{info, warn};

pub struct SupervisorConfig {
    pub hostname: String,
    pub pid: u32,
    pub capacity: usize,
    pub heartbeat_ttl: Duration,
    pub reconcile_interval: Duration,
    /// 0 means no fixed pool; a single FIFO worker is still started so the
    /// shared queue always has a consumer (see `DESIGN.md`).
    pub fifo_pool_size: usize,
    pub pinned_block_timeout: Duration,
    pub pinned_idle_close_after: Duration,
}

struct Core {
    state: NodeState,
    pinned_workers: HashMap<String, WorkerHandle>,
    fifo_workers: Vec<WorkerHandle>,
}

pub struct Supervisor {
    pub node_id: String,
    store: JobStoreRef,
    worker_ctx: WorkerContext,
    config: SupervisorConfig,
    core: RwLock<Core>,
}

impl Supervisor {
    pub fn new(node_id: String, store: JobStoreRef, worker_ctx: WorkerContext, config: SupervisorConfig) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            store,
            worker_ctx,
            config,
            core: RwLock::new(Core {
                state: NodeState::Starting,
                pinned_workers: HashMap::new(),
                fifo_workers: Vec::new(),
            }),
        })
    }

    pub async fn state(&self) -> NodeState {
        self.core.read().await.state
    }

    async fn heartbeat_fields(&self) -> NetpulseResult<HeartbeatFields> {
        let core = self.core.read().await;
        Ok(HeartbeatFields {
            hostname: self.config.hostname.clone(),
            pid: self.config.pid,
            capacity: self.config.capacity,
            current_pinned_count: core.pinned_workers.len(),
        })
    }

    /// Registers the node, starts the FIFO pool, and returns a handle pair
    /// `(heartbeat+reconcile join handle, shutdown sender)`. Call
    /// `shutdown_tx.send(())` to begin draining.
    pub async fn start(self: &Arc<Self>) -> NetpulseResult<(tokio::task::JoinHandle<()>, oneshot::Sender<()>)> {
        let fields = self.heartbeat_fields().await?;
        self.store.heartbeat(&self.node_id, fields, self.config.heartbeat_ttl).await.map_err(netpulse_common::error::NetpulseError::from)?;

        {
            let mut core = self.core.write().await;
            core.state = NodeState::Active;
            let pool = self.config.fifo_pool_size.max(1);
            for i in 0..pool {
                let handle = run_fifo_worker(self.worker_ctx.clone(), format!("{}-fifo-{i}", self.node_id), self.node_id.clone(), self.config.pinned_block_timeout);
                core.fifo_workers.push(handle);
            }
        }
        info!(node_id = %self.node_id, "node active");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = Arc::clone(self);
        let join = tokio::spawn(async move { supervisor.run_loops(shutdown_rx).await });
        Ok((join, shutdown_tx))
    }

    async fn run_loops(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut heartbeat_tick = tokio::time::interval(self.config.heartbeat_ttl / 3);
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut reconcile_tick = tokio::time::interval(self.config.reconcile_interval);
        reconcile_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    info!(node_id = %self.node_id, "draining");
                    self.drain().await;
                    return;
                }
                _ = heartbeat_tick.tick() => {
                    if let Err(e) = self.refresh_heartbeat().await {
                        warn!(node_id = %self.node_id, error = %e, "heartbeat write failed, draining");
                        self.drain().await;
                        return;
                    }
                }
                _ = reconcile_tick.tick() => {
                    reconcile::reconcile(&self).await;
                }
            }
        }
    }

    async fn refresh_heartbeat(&self) -> NetpulseResult<()> {
        let fields = self.heartbeat_fields().await?;
        self.store
            .heartbeat(&self.node_id, fields, self.config.heartbeat_ttl)
            .await
            .map_err(netpulse_common::error::NetpulseError::from)
    }

    async fn drain(&self) {
        let (pinned, fifo) = {
            let mut core = self.core.write().await;
            core.state = NodeState::Draining;
            (std::mem::take(&mut core.pinned_workers), std::mem::take(&mut core.fifo_workers))
        };
        for (host, handle) in pinned {
            handle.shutdown();
            if let Err(e) = self.store.unbind_host(&host, &self.node_id).await {
                warn!(node_id = %self.node_id, host = %host, error = %e, "failed to unbind host during drain");
            }
        }
        for handle in fifo {
            handle.shutdown();
        }
        if let Err(e) = self.store.expire_node(&self.node_id).await {
            warn!(node_id = %self.node_id, error = %e, "failed to remove node record during drain");
        }
        self.core.write().await.state = NodeState::Gone;
        info!(node_id = %self.node_id, "node gone");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use netpulse_driver::credentials::EnvCredentialProvider;
    use netpulse_driver::registry::Registry;
    use netpulse_driver::render::{PassThroughParser, PassThroughRenderer};
    use netpulse_store::mem::new_mem_store;

    use super::*;

    fn worker_ctx(store: JobStoreRef) -> WorkerContext {
        WorkerContext {
            store,
            drivers: Arc::new(Registry::with_builtin_drivers().unwrap()),
            credentials: Arc::new(EnvCredentialProvider::default()),
            render: Arc::new(PassThroughRenderer),
            parse: Arc::new(PassThroughParser),
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            hostname: "test-host".to_string(),
            pid: 1,
            capacity: 4,
            heartbeat_ttl: Duration::from_millis(300),
            reconcile_interval: Duration::from_millis(30),
            fifo_pool_size: 1,
            pinned_block_timeout: Duration::from_millis(20),
            pinned_idle_close_after: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn start_registers_node_and_becomes_active() {
        let store = new_mem_store();
        let supervisor = Supervisor::new("node-a".to_string(), store.clone(), worker_ctx(store.clone()), config());
        let (join, shutdown_tx) = supervisor.start().await.unwrap();

        assert_eq!(supervisor.state().await, NodeState::Active);
        let node = store.get_node("node-a").await.unwrap();
        assert!(node.is_some());

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();
        assert_eq!(supervisor.state().await, NodeState::Gone);
    }

    #[tokio::test]
    async fn reconcile_spawns_a_pinned_worker_for_a_newly_bound_host() {
        let store = new_mem_store();
        let supervisor = Supervisor::new("node-a".to_string(), store.clone(), worker_ctx(store.clone()), config());
        let (join, shutdown_tx) = supervisor.start().await.unwrap();

        store.bind_host("10.1.1.1", "node-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(supervisor.core.read().await.pinned_workers.contains_key("10.1.1.1"));

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_reaps_a_pinned_worker_whose_binding_disappeared() {
        let store = new_mem_store();
        let supervisor = Supervisor::new("node-a".to_string(), store.clone(), worker_ctx(store.clone()), config());
        let (join, shutdown_tx) = supervisor.start().await.unwrap();

        store.bind_host("10.1.1.2", "node-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(supervisor.core.read().await.pinned_workers.contains_key("10.1.1.2"));

        store.unbind_host("10.1.1.2", "node-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!supervisor.core.read().await.pinned_workers.contains_key("10.1.1.2"));

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_reclaims_bindings_left_by_a_node_whose_heartbeat_lapsed() {
        let store = new_mem_store();
        let dead_fields = HeartbeatFields {
            hostname: "dead".to_string(),
            pid: 2,
            capacity: 1,
            current_pinned_count: 1,
        };
        // Long enough that node-dead is still alive through the first couple
        // of reconcile ticks.
        store.heartbeat("node-dead", dead_fields, Duration::from_millis(200)).await.unwrap();
        store.bind_host("10.1.1.3", "node-dead").await.unwrap();

        let supervisor = Supervisor::new("node-a".to_string(), store.clone(), worker_ctx(store.clone()), config());
        let (join, shutdown_tx) = supervisor.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get_node("node-dead").await.unwrap().is_some());

        // Now let node-dead's heartbeat lapse and give reconcile a chance to
        // notice it fell out of `list_nodes()`.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get_node("node-dead").await.unwrap().is_none());
        assert!(store.get_host_node("10.1.1.3").await.unwrap().is_none());

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_reclaims_a_binding_for_a_node_it_never_saw_alive() {
        let store = new_mem_store();
        // node-dead's heartbeat has already lapsed before this supervisor
        // ever starts — there is no tick during which it could have been
        // observed alive.
        let dead_fields = HeartbeatFields {
            hostname: "dead".to_string(),
            pid: 2,
            capacity: 1,
            current_pinned_count: 1,
        };
        store.heartbeat("node-dead", dead_fields, Duration::from_millis(1)).await.unwrap();
        store.bind_host("10.1.1.9", "node-dead").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get_node("node-dead").await.unwrap().is_none());

        let supervisor = Supervisor::new("node-a".to_string(), store.clone(), worker_ctx(store.clone()), config());
        let (join, shutdown_tx) = supervisor.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get_host_node("10.1.1.9").await.unwrap().is_none());

        shutdown_tx.send(()).unwrap();
        join.await.unwrap();
    }
}
