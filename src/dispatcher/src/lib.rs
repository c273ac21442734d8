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

//! The dispatcher (C3): turns an HTTP-validated operation into job records
//! on the correct queue, or — for `test-connection` — performs the connect
//! attempt inline without ever touching the store.

use std::sync::Arc;
use std::time::Instant;

use netpulse_common::config::JobConfig;
use netpulse_common::error::{NetpulseError, NetpulseResult};
use netpulse_common::ids;
use netpulse_driver::credentials::CredentialProvider;
use netpulse_driver::registry::Registry;
use netpulse_driver::QueueStrategy;
use netpulse_scheduler::Scheduler;
use netpulse_store::model::{DeviceFingerprint, Job, JobFilter, JobSelector, JobStatus, OperationKind, Payload};
use netpulse_store::traits::{JobStore, JobStoreRef};
use tracing::info;

/// Per-request queue-strategy override; `None` defers to the driver's
/// `default_queue_strategy` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueStrategyOverride {
    #[default]
    Unset,
    Fifo,
    Pinned,
}

#[derive(Debug, Clone)]
pub struct DeviceOperationRequest {
    pub device: DeviceFingerprint,
    pub operation: OperationKind,
    pub payload: Payload,
    pub queue_strategy: QueueStrategyOverride,
    pub ttl_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<BulkSuccess>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkSuccess {
    pub host: String,
    pub job_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkFailure {
    pub host: String,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub connection_time_ms: u64,
    pub error: Option<String>,
}

pub struct Dispatcher {
    store: JobStoreRef,
    scheduler: Arc<Scheduler>,
    drivers: Arc<Registry>,
    credentials: Arc<dyn CredentialProvider>,
    job_defaults: JobConfig,
}

impl Dispatcher {
    pub fn new(
        store: JobStoreRef,
        scheduler: Arc<Scheduler>,
        drivers: Arc<Registry>,
        credentials: Arc<dyn CredentialProvider>,
        job_defaults: JobConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            drivers,
            credentials,
            job_defaults,
        }
    }

    fn validate(&self, request: &DeviceOperationRequest) -> NetpulseResult<()> {
        if request.device.host.trim().is_empty() {
            return Err(NetpulseError::Validation("device host must not be empty".into()));
        }
        Ok(())
    }

    async fn resolve_credential(&self, request: &DeviceOperationRequest) -> NetpulseResult<()> {
        if let Some(reference) = &request.device.credential_ref {
            // Resolved only to confirm it exists before enqueue; the worker
            // re-resolves (and may get a fresher secret) at execution time.
            self.credentials.resolve(reference).await?;
        }
        Ok(())
    }

    /// Authoritative queue-selection rule (§4.3): a pool-safe driver not
    /// explicitly pinned by the caller goes on `fifo`; everything else goes
    /// through the scheduler onto its host's pinned queue.
    async fn choose_queue(&self, request: &DeviceOperationRequest) -> NetpulseResult<(String, Option<String>)> {
        let driver = self.drivers.resolve(&request.device.driver)?;
        let wants_pinned = matches!(request.queue_strategy, QueueStrategyOverride::Pinned)
            || (request.queue_strategy == QueueStrategyOverride::Unset && driver.default_queue_strategy() == QueueStrategy::Pinned);

        if driver.pool_safe() && !wants_pinned {
            return Ok((ids::FIFO_QUEUE.to_string(), None));
        }

        let node_id = self.scheduler.choose_node(&request.device.host).await?;
        Ok((ids::pinned_queue_name(&request.device.host), Some(node_id)))
    }

    pub async fn submit_device_job(&self, request: DeviceOperationRequest) -> NetpulseResult<String> {
        self.validate(&request)?;
        self.resolve_credential(&request).await?;
        let (queue, node_id) = self.choose_queue(&request).await?;

        let now = ids::now_ms();
        let job = Job {
            id: ids::new_job_id(),
            driver: request.device.driver.clone(),
            operation: request.operation,
            device: request.device.clone(),
            payload: request.payload.clone(),
            queue: queue.clone(),
            status: JobStatus::Queued,
            created_at: now,
            started_at: None,
            ended_at: None,
            ttl_secs: request.ttl_secs.unwrap_or(self.job_defaults.ttl_secs),
            timeout_secs: request.timeout_secs.unwrap_or(self.job_defaults.timeout_secs),
            result_retention_secs: self.job_defaults.result_retention_secs,
            result: None,
            cancel_requested: false,
            node_id,
        };

        let id = self.store.enqueue(&queue, job).await.map_err(NetpulseError::from)?;
        info!(job_id = %id, queue = %queue, "job enqueued");
        Ok(id)
    }

    /// Fan-out: each device is dispatched independently; a `NoCapacity` (or
    /// any other) failure for one host is reported alongside the others,
    /// never aborting the whole request. Defaults to pinned strategy and the
    /// configured bulk TTL unless the caller already set one.
    pub async fn submit_bulk(&self, template: DeviceOperationRequest, devices: Vec<DeviceFingerprint>) -> NetpulseResult<BulkOutcome> {
        if devices.is_empty() {
            return Err(NetpulseError::Validation("bulk request must include at least one device".into()));
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for device in devices {
            let host = device.host.clone();
            let mut request = template.clone();
            request.device = device;
            if request.queue_strategy == QueueStrategyOverride::Unset {
                request.queue_strategy = QueueStrategyOverride::Pinned;
            }
            request.ttl_secs.get_or_insert(self.job_defaults.bulk_ttl_secs);

            match self.submit_device_job(request).await {
                Ok(job_id) => succeeded.push(BulkSuccess { host, job_id }),
                Err(e) => {
                    tracing::debug!(host = %host, error = %e, "bulk device dispatch failed");
                    failed.push(BulkFailure { host, reason: e.to_string() });
                }
            }
        }
        Ok(BulkOutcome { succeeded, failed })
    }

    /// Synchronous: never touches the store. Performs a connect (and
    /// immediate disconnect) against a short-lived session.
    pub async fn test_connection(&self, device: DeviceFingerprint) -> NetpulseResult<ConnectionCheck> {
        if device.host.trim().is_empty() {
            return Err(NetpulseError::Validation("device host must not be empty".into()));
        }
        let driver = self.drivers.resolve(&device.driver)?;
        let secret = match &device.credential_ref {
            Some(reference) => self.credentials.resolve(reference).await?,
            None => netpulse_driver::credentials::Secret::default(),
        };

        let started = Instant::now();
        match driver.connect(&device, &secret).await {
            Ok(session) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let _ = driver.disconnect(session).await;
                Ok(ConnectionCheck {
                    success: true,
                    connection_time_ms: elapsed,
                    error: None,
                })
            }
            Err(e) => Ok(ConnectionCheck {
                success: false,
                connection_time_ms: started.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            }),
        }
    }

    pub async fn query_jobs(&self, filter: JobFilter) -> NetpulseResult<Vec<Job>> {
        self.store.list_jobs(filter).await.map_err(NetpulseError::from)
    }

    /// Cancelling a queued job removes it atomically and marks it
    /// `cancelled`; cancelling a running job sets the cancellation marker
    /// the worker polls, and the worker is the one that ultimately writes
    /// `stopped` once it observes the marker.
    pub async fn cancel_job(&self, selector: JobSelector) -> NetpulseResult<()> {
        self.store.delete_job(selector).await.map_err(NetpulseError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use netpulse_driver::credentials::EnvCredentialProvider;
    use netpulse_driver::registry::Registry;
    use netpulse_store::mem::new_mem_store;
    use netpulse_store::traits::HeartbeatFields;
    use serde_json::Value as JsonValue;

    use super::*;

    fn device(host: &str, driver: &str) -> DeviceFingerprint {
        DeviceFingerprint {
            host: host.to_string(),
            port: None,
            driver: driver.to_string(),
            connection_args: JsonValue::Null,
            credential_ref: None,
        }
    }

    fn request(host: &str, driver: &str) -> DeviceOperationRequest {
        DeviceOperationRequest {
            device: device(host, driver),
            operation: OperationKind::Execute,
            payload: Payload::Command("show version".to_string()),
            queue_strategy: QueueStrategyOverride::Unset,
            ttl_secs: None,
            timeout_secs: None,
        }
    }

    async fn dispatcher() -> (Dispatcher, JobStoreRef) {
        let store = new_mem_store();
        let scheduler = Arc::new(Scheduler::least_load(store.clone()));
        let drivers = Arc::new(Registry::with_builtin_drivers().unwrap());
        let credentials = Arc::new(EnvCredentialProvider::default());
        let dispatcher = Dispatcher::new(store.clone(), scheduler, drivers, credentials, JobConfig::default());
        (dispatcher, store)
    }

    #[tokio::test]
    async fn pool_safe_driver_goes_to_fifo_queue() {
        let (dispatcher, store) = dispatcher().await;
        let id = dispatcher.submit_device_job(request("10.0.0.1", "restconf")).await.unwrap();
        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.queue, "fifo");
    }

    #[tokio::test]
    async fn sticky_driver_requires_capacity_and_goes_pinned() {
        let (dispatcher, store) = dispatcher().await;
        store
            .heartbeat(
                "node-a",
                HeartbeatFields {
                    hostname: "h".into(),
                    pid: 1,
                    capacity: 4,
                    current_pinned_count: 0,
                },
                std::time::Duration::from_secs(30),
            )
            .await
            .unwrap();

        let id = dispatcher.submit_device_job(request("10.0.0.2", "mock")).await.unwrap();
        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.queue, "pinned_10.0.0.2");
        assert_eq!(job.node_id, Some("node-a".to_string()));
    }

    #[tokio::test]
    async fn sticky_driver_with_no_capacity_fails() {
        let (dispatcher, _store) = dispatcher().await;
        let err = dispatcher.submit_device_job(request("10.0.0.3", "mock")).await.unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::NoCapacity);
    }

    #[tokio::test]
    async fn bulk_reports_per_host_failures_without_aborting() {
        let (dispatcher, store) = dispatcher().await;
        store
            .heartbeat(
                "node-a",
                HeartbeatFields {
                    hostname: "h".into(),
                    pid: 1,
                    capacity: 1,
                    current_pinned_count: 0,
                },
                std::time::Duration::from_secs(30),
            )
            .await
            .unwrap();

        let outcome = dispatcher
            .submit_bulk(
                request("placeholder", "mock"),
                vec![device("10.0.0.4", "mock"), device("10.0.0.5", "mock")],
            )
            .await
            .unwrap();
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].host, "10.0.0.5");
    }

    #[tokio::test]
    async fn empty_bulk_request_is_rejected() {
        let (dispatcher, _store) = dispatcher().await;
        let err = dispatcher.submit_bulk(request("x", "mock"), vec![]).await.unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_connection_against_mock_driver_succeeds() {
        let (dispatcher, _store) = dispatcher().await;
        let check = dispatcher.test_connection(device("10.0.0.6", "mock")).await.unwrap();
        assert!(check.success);
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        let (dispatcher, _store) = dispatcher().await;
        let err = dispatcher.submit_device_job(request("", "mock")).await.unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cancel_removes_queued_job() {
        let (dispatcher, store) = dispatcher().await;
        let id = dispatcher.submit_device_job(request("10.0.0.7", "restconf")).await.unwrap();
        dispatcher.cancel_job(JobSelector::Id(id.clone())).await.unwrap();
        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
