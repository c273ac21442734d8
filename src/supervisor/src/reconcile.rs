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

//! The reconcile pass (§4.4): spawn pinned workers for newly-bound hosts,
//! reap pinned workers whose binding disappeared, and reclaim bindings left
//! behind by nodes whose heartbeat has lapsed.

use std::collections::HashSet;

use netpulse_store::JobStore;
use netpulse_worker::run_pinned_worker;
use tracing::{info, warn};

use crate::Supervisor;

pub async fn reconcile(supervisor: &Supervisor) {
    reclaim_orphans(supervisor).await;
    sync_pinned_workers(supervisor).await;
}

/// Scans every binding this store knows about and reclaims the ones whose
/// node is not currently alive, regardless of whether this supervisor ever
/// personally observed that node. A supervisor that starts after a node has
/// already died (pool scale-up, restart) must still be able to reclaim that
/// node's bindings on its very first reconcile tick; tracking "previously
/// seen, now gone" locally can't do that, since it never saw the dead node
/// to begin with.
async fn reclaim_orphans(supervisor: &Supervisor) {
    let alive: HashSet<String> = match supervisor.store.list_nodes().await {
        Ok(nodes) => nodes.into_iter().map(|n| n.node_id).collect(),
        Err(e) => {
            warn!(node_id = %supervisor.node_id, error = %e, "failed to list nodes during reconcile");
            return;
        }
    };

    let bindings = match supervisor.store.list_bindings().await {
        Ok(bindings) => bindings,
        Err(e) => {
            warn!(node_id = %supervisor.node_id, error = %e, "failed to list bindings during reconcile");
            return;
        }
    };

    for (host, node) in bindings {
        if node == supervisor.node_id || alive.contains(&node) {
            continue;
        }
        match supervisor.store.unbind_host(&host, &node).await {
            Ok(true) => info!(node_id = %supervisor.node_id, host = %host, dead_node = %node, "reclaimed orphan binding"),
            Ok(false) => {}
            Err(e) => warn!(node_id = %supervisor.node_id, host = %host, error = %e, "failed to reclaim orphan binding"),
        }
    }
}

/// Spawns a pinned worker for every host bound to this node without one yet
/// (capped at `pinned_per_node`), and signals any pinned worker whose
/// binding has disappeared to exit.
async fn sync_pinned_workers(supervisor: &Supervisor) {
    let hosts = match supervisor.store.list_hosts_for_node(&supervisor.node_id).await {
        Ok(hosts) => hosts,
        Err(e) => {
            warn!(node_id = %supervisor.node_id, error = %e, "failed to list own hosts during reconcile");
            return;
        }
    };
    let bound: HashSet<String> = hosts.into_iter().collect();

    let mut core = supervisor.core.write().await;

    let stale: Vec<String> = core.pinned_workers.keys().filter(|host| !bound.contains(*host)).cloned().collect();
    for host in stale {
        if let Some(handle) = core.pinned_workers.remove(&host) {
            info!(node_id = %supervisor.node_id, host = %host, "binding gone, stopping pinned worker");
            handle.shutdown();
        }
    }

    let capacity = supervisor.config.capacity;
    for host in bound {
        if core.pinned_workers.contains_key(&host) {
            continue;
        }
        if core.pinned_workers.len() >= capacity {
            warn!(node_id = %supervisor.node_id, host = %host, "at pinned capacity, deferring spawn");
            continue;
        }
        let id = format!("{}-pinned-{host}", supervisor.node_id);
        let handle = run_pinned_worker(
            supervisor.worker_ctx.clone(),
            id,
            supervisor.node_id.clone(),
            host.clone(),
            supervisor.config.pinned_block_timeout,
            supervisor.config.pinned_idle_close_after,
        );
        info!(node_id = %supervisor.node_id, host = %host, "spawned pinned worker");
        core.pinned_workers.insert(host, handle);
    }
}
