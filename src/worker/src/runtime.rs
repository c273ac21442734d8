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

//! The worker loop shared by pinned and FIFO workers (§4.5). The two
//! variants differ only in whether a device session survives past a single
//! job; everything else — claim, timeout enforcement, cancellation
//! checkpoints, result recording — is identical.

use std::collections::BTreeMap;
use std::time::Duration;

use netpulse_common::error::{ErrorKind, NetpulseError, NetpulseResult};
use netpulse_common::ids;
use netpulse_store::model::{Job, JobError, JobResult, JobStatus, OperationKind, Payload, WorkerKind, WorkerRecord};
use netpulse_store::traits::{JobStore, JobUpdate};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session_cache::CachedSession;
use crate::WorkerContext;

/// How long between polls of the store for a running job's cancellation
/// marker. This is the "checkpoint" the spec describes for best-effort
/// running cancellation, given the worker holds no finer-grained hook into
/// the driver call itself.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct WorkerHandle {
    pub id: String,
    shutdown_tx: oneshot::Sender<()>,
    pub join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Requests a graceful stop; the worker finishes any in-flight job
    /// before exiting.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

pub fn run_pinned_worker(ctx: WorkerContext, id: String, node_id: String, host: String, block_timeout: Duration, idle_close_after: Duration) -> WorkerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let queues = vec![ids::pinned_queue_name(&host)];
    let join = tokio::spawn(worker_loop(
        ctx,
        id.clone(),
        node_id,
        WorkerKind::Pinned,
        queues,
        block_timeout,
        Some(idle_close_after),
        shutdown_rx,
    ));
    WorkerHandle { id, shutdown_tx, join }
}

pub fn run_fifo_worker(ctx: WorkerContext, id: String, node_id: String, block_timeout: Duration) -> WorkerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let queues = vec![ids::FIFO_QUEUE.to_string()];
    let join = tokio::spawn(worker_loop(ctx, id.clone(), node_id, WorkerKind::Fifo, queues, block_timeout, None, shutdown_rx));
    WorkerHandle { id, shutdown_tx, join }
}

async fn worker_loop(
    ctx: WorkerContext,
    id: String,
    node_id: String,
    kind: WorkerKind,
    queues: Vec<String>,
    block_timeout: Duration,
    idle_close_after: Option<Duration>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut cached: Option<CachedSession> = None;
    let cache_session = matches!(kind, WorkerKind::Pinned);
    publish_worker_record(&ctx, &id, kind, &queues, &node_id).await;

    loop {
        let claimed = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!(worker_id = %id, "shutdown signal received, draining");
                break;
            }
            result = ctx.store.dequeue(&queues, block_timeout) => result,
        };

        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                maybe_close_idle_session(&ctx, &mut cached, idle_close_after).await;
                continue;
            }
            Err(e) => {
                warn!(worker_id = %id, error = %e, "dequeue failed");
                continue;
            }
        };

        process_job(&ctx, &id, job, &mut cached, cache_session).await;
        publish_worker_record(&ctx, &id, kind, &queues, &node_id).await;
    }

    if let Some(session) = cached.take() {
        disconnect_cached(&ctx, session).await;
    }
    let _ = ctx.store.remove_worker(&id).await;
}

async fn publish_worker_record(ctx: &WorkerContext, id: &str, kind: WorkerKind, queues: &[String], node_id: &str) {
    let record = WorkerRecord {
        id: id.to_string(),
        kind,
        queues: queues.to_vec(),
        node_id: node_id.to_string(),
        last_seen: ids::now_ms(),
    };
    if let Err(e) = ctx.store.upsert_worker(record).await {
        warn!(worker_id = %id, error = %e, "failed to publish worker record");
    }
}

async fn maybe_close_idle_session(ctx: &WorkerContext, cached: &mut Option<CachedSession>, idle_close_after: Option<Duration>) {
    let Some(idle_after) = idle_close_after else { return };
    let should_close = matches!(cached, Some(c) if c.idle_for() > idle_after);
    if should_close {
        if let Some(session) = cached.take() {
            debug!(host = %session.host, "closing idle pinned session");
            disconnect_cached(ctx, session).await;
        }
    }
}

async fn disconnect_cached(ctx: &WorkerContext, cached: CachedSession) {
    if let Ok(driver) = ctx.drivers.resolve(&cached.driver_name) {
        let _ = driver.disconnect(cached.session).await;
    }
}

/// Steps 2-8 of the common loop for a single claimed job. `cache_session`
/// is false for FIFO workers: every job gets its own connect/disconnect
/// regardless of whether the previous job touched the same host.
async fn process_job(ctx: &WorkerContext, worker_id: &str, job: Job, cached: &mut Option<CachedSession>, cache_session: bool) {
    let job_id = job.id.clone();
    let now = ids::now_ms();
    if let Err(e) = ctx
        .store
        .set_status(
            &job_id,
            JobStatus::Running,
            JobUpdate {
                started_at: Some(now),
                ..Default::default()
            },
        )
        .await
    {
        warn!(worker_id, job_id = %job_id, error = %e, "failed to mark job running");
        return;
    }

    let timeout = Duration::from_secs(job.timeout_secs.max(1));
    let outcome = tokio::select! {
        biased;
        cancelled = poll_cancelled(ctx, &job_id) => {
            let _ = cancelled;
            Outcome::Cancelled
        }
        result = tokio::time::timeout(timeout, run_operation(ctx, &job, cached, cache_session)) => {
            match result {
                Ok(Ok(result)) => Outcome::Finished(result),
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_elapsed) => Outcome::TimedOut,
            }
        }
    };

    // Device state is unknown after a timeout or a mid-flight cancellation;
    // tear the session down so the next job reconnects fresh.
    if matches!(outcome, Outcome::TimedOut | Outcome::Cancelled) {
        if let Some(session) = cached.take() {
            disconnect_cached(ctx, session).await;
        }
    }

    finalize(ctx, worker_id, &job, outcome).await;
}

enum Outcome {
    Finished(JobResult),
    Failed(NetpulseError),
    TimedOut,
    Cancelled,
}

/// Polls until the job's cancellation marker is observed. Runs concurrently
/// with the driver call via `select!`; whichever resolves first wins.
async fn poll_cancelled(ctx: &WorkerContext, job_id: &str) -> bool {
    loop {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
        match ctx.store.get_job(job_id).await {
            Ok(Some(job)) if job.cancel_requested => return true,
            Ok(Some(_)) => continue,
            Ok(None) => return true,
            Err(_) => continue,
        }
    }
}

async fn run_operation(ctx: &WorkerContext, job: &Job, cached: &mut Option<CachedSession>, cache_session: bool) -> NetpulseResult<JobResult> {
    let driver = ctx.drivers.resolve(&job.driver)?;

    let reusable = cache_session && matches!(cached.as_ref(), Some(c) if c.matches(&job.device.host, &job.driver));
    if !reusable {
        if let Some(stale) = cached.take() {
            disconnect_cached(ctx, stale).await;
        }
        let secret = match &job.device.credential_ref {
            Some(reference) => ctx.credentials.resolve(reference).await?,
            None => netpulse_driver::credentials::Secret::default(),
        };
        let session = driver.connect(&job.device, &secret).await?;
        *cached = Some(CachedSession {
            host: job.device.host.clone(),
            driver_name: job.driver.clone(),
            session,
            last_used: std::time::Instant::now(),
        });
    }

    let slot = cached.as_mut().expect("just populated above");
    let result = execute_with_driver(driver.as_ref(), slot.session.as_mut(), job, ctx).await;
    if result.is_ok() {
        slot.touch();
    } else if matches!(&result, Err(e) if e.kind() == ErrorKind::Connection) {
        // Session is presumed dead; drop it so the next job reconnects.
        if let Some(stale) = cached.take() {
            disconnect_cached(ctx, stale).await;
        }
    }

    // FIFO workers never keep a session past the job that opened it.
    if !cache_session {
        if let Some(session) = cached.take() {
            disconnect_cached(ctx, session).await;
        }
    }

    result
}

async fn execute_with_driver(
    driver: &dyn netpulse_driver::Driver,
    session: &mut dyn netpulse_driver::Session,
    job: &Job,
    ctx: &WorkerContext,
) -> NetpulseResult<JobResult> {
    match job.operation {
        OperationKind::Execute => {
            let commands = commands_for_execute(&job.payload)?;
            let retval = driver.execute(session, &commands).await?;
            let retval = apply_parse_hook(ctx, retval);
            Ok(JobResult {
                retval,
                error: None,
                connection_time_ms: None,
            })
        }
        OperationKind::Push => {
            let lines = lines_for_push(&job.payload, ctx.render.as_ref())?;
            let retval = driver.apply_config(session, &lines).await?;
            Ok(JobResult {
                retval,
                error: None,
                connection_time_ms: None,
            })
        }
        OperationKind::TestConnection => Ok(JobResult {
            retval: BTreeMap::new(),
            error: None,
            connection_time_ms: Some(0),
        }),
    }
}

fn apply_parse_hook(ctx: &WorkerContext, retval: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, serde_json::Value> {
    retval
        .into_iter()
        .map(|(command, output)| {
            let raw = match &output {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match ctx.parse.parse(&raw, &command) {
                Ok(parsed) => (command, parsed),
                Err(_) => (command, output),
            }
        })
        .collect()
}

fn commands_for_execute(payload: &Payload) -> NetpulseResult<Vec<String>> {
    match payload {
        Payload::Command(command) => Ok(vec![command.clone()]),
        Payload::Commands(commands) => Ok(commands.clone()),
        _ => Err(NetpulseError::Validation("execute operation requires a command or commands payload".into())),
    }
}

/// `ConfigContext` is expected to carry `{"template": "...", "context": {...}}`;
/// the renderer turns it into lines before the driver ever sees it.
fn lines_for_push(payload: &Payload, render: &dyn netpulse_driver::render::RenderHook) -> NetpulseResult<Vec<String>> {
    match payload {
        Payload::ConfigLines(lines) => Ok(lines.clone()),
        Payload::ConfigText(text) => Ok(text.lines().map(str::to_string).collect()),
        Payload::ConfigContext(value) => {
            let template = value
                .get("template")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| NetpulseError::Validation("config_context payload requires a 'template' field".into()))?;
            let context = value.get("context").cloned().unwrap_or(serde_json::Value::Object(Default::default()));
            let rendered = render.render(template, &context)?;
            Ok(rendered.lines().map(str::to_string).collect())
        }
        _ => Err(NetpulseError::Validation("push operation requires a config payload".into())),
    }
}

async fn finalize(ctx: &WorkerContext, worker_id: &str, job: &Job, outcome: Outcome) {
    let ended_at = ids::now_ms();
    let (status, fields) = match outcome {
        Outcome::Finished(result) => (
            JobStatus::Finished,
            JobUpdate {
                ended_at: Some(ended_at),
                result: Some(result),
                ..Default::default()
            },
        ),
        Outcome::Failed(e) => (
            JobStatus::Failed,
            JobUpdate {
                ended_at: Some(ended_at),
                result: Some(JobResult {
                    retval: BTreeMap::new(),
                    error: Some(JobError {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                    connection_time_ms: None,
                }),
                ..Default::default()
            },
        ),
        Outcome::TimedOut => (
            JobStatus::Failed,
            JobUpdate {
                ended_at: Some(ended_at),
                result: Some(JobResult {
                    retval: BTreeMap::new(),
                    error: Some(JobError {
                        kind: ErrorKind::Timeout,
                        message: format!("execution exceeded {}s timeout", job.timeout_secs),
                    }),
                    connection_time_ms: None,
                }),
                ..Default::default()
            },
        ),
        Outcome::Cancelled => (
            JobStatus::Stopped,
            JobUpdate {
                ended_at: Some(ended_at),
                result: Some(JobResult {
                    retval: BTreeMap::new(),
                    error: Some(JobError {
                        kind: ErrorKind::Cancelled,
                        message: "job was cancelled while running".to_string(),
                    }),
                    connection_time_ms: None,
                }),
                ..Default::default()
            },
        ),
    };

    if let Err(e) = ctx.store.set_status(&job.id, status, fields).await {
        warn!(worker_id, job_id = %job.id, error = %e, "failed to record job outcome");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use netpulse_driver::credentials::EnvCredentialProvider;
    use netpulse_driver::registry::Registry;
    use netpulse_driver::render::{PassThroughParser, PassThroughRenderer};
    use netpulse_store::mem::new_mem_store;
    use netpulse_store::model::{DeviceFingerprint, JobStatus};
    use netpulse_store::test_support::sample_job;
    use serde_json::Value as JsonValue;

    use super::*;
    use crate::WorkerContext;

    fn context() -> WorkerContext {
        WorkerContext {
            store: new_mem_store(),
            drivers: Arc::new(Registry::with_builtin_drivers().unwrap()),
            credentials: Arc::new(EnvCredentialProvider::default()),
            render: Arc::new(PassThroughRenderer),
            parse: Arc::new(PassThroughParser),
        }
    }

    #[tokio::test]
    async fn pinned_worker_runs_a_claimed_job_to_completion() {
        let ctx = context();
        let mut job = sample_job("10.0.0.1", "pinned_10.0.0.1");
        job.driver = "mock".to_string();
        job.device = DeviceFingerprint {
            host: "10.0.0.1".to_string(),
            port: None,
            driver: "mock".to_string(),
            connection_args: JsonValue::Null,
            credential_ref: None,
        };
        job.payload = Payload::Command("show version".to_string());
        let job_id = job.id.clone();
        ctx.store.enqueue("pinned_10.0.0.1", job).await.unwrap();

        let handle = run_pinned_worker(ctx.clone(), "w1".to_string(), "node-a".to_string(), "10.0.0.1".to_string(), Duration::from_millis(20), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let job = ctx.store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert!(job.result.unwrap().retval.contains_key("show version"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn pinned_worker_reuses_one_session_across_consecutive_same_host_jobs() {
        let mock = Arc::new(netpulse_driver::mock::MockDriver::default());
        let mut registry = Registry::new();
        registry.register(mock.clone());
        let ctx = WorkerContext {
            store: new_mem_store(),
            drivers: Arc::new(registry),
            credentials: Arc::new(EnvCredentialProvider::default()),
            render: Arc::new(PassThroughRenderer),
            parse: Arc::new(PassThroughParser),
        };

        for _ in 0..2 {
            let mut job = sample_job("10.0.0.1", "pinned_10.0.0.1");
            job.driver = "mock".to_string();
            job.device.driver = "mock".to_string();
            job.device.host = "10.0.0.1".to_string();
            job.payload = Payload::Command("show version".to_string());
            ctx.store.enqueue("pinned_10.0.0.1", job).await.unwrap();
        }

        let handle = run_pinned_worker(ctx.clone(), "w5".to_string(), "node-a".to_string(), "10.0.0.1".to_string(), Duration::from_millis(20), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown();

        let jobs = ctx.store.list_jobs(Default::default()).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Finished));
        assert_eq!(mock.connect_count(), 1, "consecutive pinned jobs against the same host must share one session");
    }

    #[tokio::test]
    async fn fifo_worker_never_caches_a_session_across_jobs() {
        let ctx = context();
        for host in ["10.0.0.2", "10.0.0.3"] {
            let mut job = sample_job(host, "fifo");
            job.driver = "mock".to_string();
            job.device.driver = "mock".to_string();
            job.device.host = host.to_string();
            job.payload = Payload::Command("show clock".to_string());
            ctx.store.enqueue("fifo", job).await.unwrap();
        }

        let handle = run_fifo_worker(ctx.clone(), "w2".to_string(), "node-a".to_string(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown();

        let jobs = ctx.store.list_jobs(Default::default()).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Finished));
    }

    #[tokio::test]
    async fn fifo_worker_reconnects_even_for_two_jobs_against_the_same_host() {
        let mock = Arc::new(netpulse_driver::mock::MockDriver::default());
        let mut registry = Registry::new();
        registry.register(mock.clone());
        let ctx = WorkerContext {
            store: new_mem_store(),
            drivers: Arc::new(registry),
            credentials: Arc::new(EnvCredentialProvider::default()),
            render: Arc::new(PassThroughRenderer),
            parse: Arc::new(PassThroughParser),
        };

        for _ in 0..2 {
            let mut job = sample_job("10.0.0.5", "fifo");
            job.driver = "mock".to_string();
            job.device.driver = "mock".to_string();
            job.device.host = "10.0.0.5".to_string();
            job.payload = Payload::Command("show clock".to_string());
            ctx.store.enqueue("fifo", job).await.unwrap();
        }

        let handle = run_fifo_worker(ctx.clone(), "w4".to_string(), "node-a".to_string(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown();

        let jobs = ctx.store.list_jobs(Default::default()).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Finished));
        assert_eq!(mock.connect_count(), 2, "each FIFO job against the same host must open its own session");
    }

    #[tokio::test]
    async fn unknown_driver_fails_the_job_without_panicking() {
        let ctx = context();
        let mut job = sample_job("10.0.0.4", "fifo");
        job.driver = "does-not-exist".to_string();
        job.device.driver = "does-not-exist".to_string();
        let job_id = job.id.clone();
        ctx.store.enqueue("fifo", job).await.unwrap();

        let handle = run_fifo_worker(ctx.clone(), "w3".to_string(), "node-a".to_string(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown();

        let job = ctx.store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.result.unwrap().error.unwrap().kind, ErrorKind::Validation);
    }
}
