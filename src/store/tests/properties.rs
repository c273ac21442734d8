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

//! Exercises the testable properties from the source spec (P1-P9) against
//! `MemStore` directly. These are store-level guarantees, not transport
//! guarantees, so no network/HTTP layer is involved.

use std::time::Duration;

use netpulse_store::mem::MemStore;
use netpulse_store::model::{JobFilter, JobSelector, JobStatus};
use netpulse_store::test_support::sample_job;
use netpulse_store::traits::{HeartbeatFields, JobUpdate};
use netpulse_store::JobStore;

#[tokio::test]
async fn p2_single_consumer_per_pinned_queue() {
    let store = MemStore::new();
    for _ in 0..5 {
        store
            .enqueue("pinned_10.0.0.9", sample_job("10.0.0.9", "pinned_10.0.0.9"))
            .await
            .unwrap();
    }

    // Two "workers" race to claim from the same pinned queue; each job must
    // only ever be claimed once.
    let queues = vec!["pinned_10.0.0.9".to_string()];
    let a = store.dequeue(&queues, Duration::from_millis(5)).await.unwrap();
    let b = store.dequeue(&queues, Duration::from_millis(5)).await.unwrap();
    assert_ne!(a.unwrap().id, b.unwrap().id);
}

#[tokio::test]
async fn p3_binding_uniqueness() {
    let store = MemStore::new();
    store.bind_host("10.0.0.1", "node-a").await.unwrap();
    store.bind_host("10.0.0.1", "node-b").await.unwrap(); // loses the race

    let hosts_on_a = store.list_hosts_for_node("node-a").await.unwrap();
    let hosts_on_b = store.list_hosts_for_node("node-b").await.unwrap();
    assert_eq!(hosts_on_a, vec!["10.0.0.1"]);
    assert!(hosts_on_b.is_empty());
}

#[tokio::test]
async fn p5_orphan_binding_is_reclaimable_after_heartbeat_expiry() {
    let store = MemStore::new();
    store
        .heartbeat(
            "node-dead",
            HeartbeatFields {
                hostname: "h".into(),
                pid: 1,
                capacity: 4,
                current_pinned_count: 1,
            },
            Duration::from_millis(10),
        )
        .await
        .unwrap();
    store.bind_host("10.0.0.2", "node-dead").await.unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(store.get_node("node-dead").await.unwrap().is_none());

    // A surviving supervisor's reconcile loop would now see the binding
    // points at a dead node and unbind it unconditionally (the owning node
    // cannot contest the CAS because it is gone).
    let unbound = store.unbind_host("10.0.0.2", "node-dead").await.unwrap();
    assert!(unbound);
    assert_eq!(store.get_host_node("10.0.0.2").await.unwrap(), None);
}

#[tokio::test]
async fn p6_result_readable_until_retention_elapses() {
    let store = MemStore::new();
    let mut job = sample_job("10.0.0.3", "fifo");
    job.result_retention_secs = 3600;
    let id = job.id.clone();
    store.enqueue("fifo", job).await.unwrap();
    store
        .set_status(
            &id,
            JobStatus::Finished,
            JobUpdate {
                ended_at: Some(netpulse_common::ids::now_ms()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store.sweep().await.unwrap();
    assert!(store.get_job(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn p7_idempotent_scheduling_race() {
    let store = netpulse_store::mem::new_mem_store();
    let mut handles = vec![];
    for i in 0..8 {
        let store = std::sync::Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.bind_host("10.0.0.4", &format!("node-{i}")).await.unwrap()
        }));
    }
    let mut winners = std::collections::HashSet::new();
    for h in handles {
        winners.insert(h.await.unwrap());
    }
    assert_eq!(winners.len(), 1, "all concurrent binds must agree on one winner");
}

#[tokio::test]
async fn p9_cancellation_is_atomic_for_queued_jobs() {
    let store = MemStore::new();
    let job_x = sample_job("10.0.0.5", "pinned_10.0.0.5");
    let job_y = sample_job("10.0.0.5", "pinned_10.0.0.5");
    let y_id = job_y.id.clone();
    store.enqueue("pinned_10.0.0.5", job_x).await.unwrap();
    store.enqueue("pinned_10.0.0.5", job_y).await.unwrap();

    store.delete_job(JobSelector::Id(y_id.clone())).await.unwrap();

    let y = store.get_job(&y_id).await.unwrap().unwrap();
    assert_eq!(y.status, JobStatus::Cancelled);

    // X is still claimable and unaffected.
    let claimed = store
        .dequeue(&["pinned_10.0.0.5".to_string()], Duration::from_millis(10))
        .await
        .unwrap();
    assert!(claimed.is_some());
    assert_ne!(claimed.unwrap().id, y_id);
}

#[tokio::test]
async fn list_jobs_filters_by_host_and_status() {
    let store = MemStore::new();
    store.enqueue("fifo", sample_job("a.example", "fifo")).await.unwrap();
    store.enqueue("fifo", sample_job("b.example", "fifo")).await.unwrap();

    let for_a = store
        .list_jobs(JobFilter {
            host: Some("a.example".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].device.host, "a.example");
}
