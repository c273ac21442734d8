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

//! Route handlers (§6): the thin HTTP-validation/translation layer in
//! front of [`netpulse_dispatcher::Dispatcher`]. Every handler's only job
//! is to normalize its request body, call the dispatcher, and wrap the
//! result in the bit-exact `{code, message, data}` envelope.

use axum::extract::{Query, State};
use netpulse_common::error::{NetpulseError, NetpulseResult};
use netpulse_dispatcher::DeviceOperationRequest;
use netpulse_store::model::{JobFilter, JobSelector, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dto::{self, BulkRequestBody, ExecuteRequestBody, TestConnectionRequestBody};
use crate::envelope::ApiResponse;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
    pub status: String,
    pub queue: String,
}

pub async fn execute(State(state): State<SharedState>, axum::Json(body): axum::Json<ExecuteRequestBody>) -> Result<ApiResponse<SubmitResponse>, ApiError> {
    let queue_strategy = body.options.strategy_override()?;
    let (operation, payload) = dto::normalize_payload(body.command, body.config)?;
    let device = body.device.into_fingerprint(&body.driver);

    let request = DeviceOperationRequest {
        device,
        operation,
        payload,
        queue_strategy,
        ttl_secs: body.options.ttl_secs,
        timeout_secs: body.options.timeout_secs,
    };

    let id = state.dispatcher.submit_device_job(request).await?;
    let job = state.dispatcher.query_jobs(JobFilter { id: Some(id.clone()), ..Default::default() }).await?;
    let job = job.into_iter().next().ok_or_else(|| NetpulseError::Other(anyhow::anyhow!("job {id} vanished immediately after enqueue")))?;

    Ok(ApiResponse::ok(SubmitResponse {
        id: job.id,
        status: job.status.as_str().to_string(),
        queue: job.queue,
    }))
}

pub async fn bulk(State(state): State<SharedState>, axum::Json(body): axum::Json<BulkRequestBody>) -> Result<ApiResponse<netpulse_dispatcher::BulkOutcome>, ApiError> {
    let queue_strategy = body.options.strategy_override()?;
    let (operation, payload) = dto::normalize_payload(body.command, body.config)?;

    let template = DeviceOperationRequest {
        device: netpulse_store::model::DeviceFingerprint {
            host: String::new(),
            port: None,
            driver: body.driver.clone(),
            connection_args: serde_json::Value::Null,
            credential_ref: None,
        },
        operation,
        payload,
        queue_strategy,
        ttl_secs: body.options.ttl_secs,
        timeout_secs: body.options.timeout_secs,
    };

    let devices: Vec<_> = body.devices.into_iter().map(|d| d.into_fingerprint(&body.driver)).collect();
    let outcome = state.dispatcher.submit_bulk(template, devices).await?;
    Ok(ApiResponse::ok(outcome))
}

pub async fn test_connection(
    State(state): State<SharedState>,
    axum::Json(body): axum::Json<TestConnectionRequestBody>,
) -> Result<ApiResponse<netpulse_dispatcher::ConnectionCheck>, ApiError> {
    let device = body.device.into_fingerprint(&body.driver);
    let check = state.dispatcher.test_connection(device).await?;
    Ok(ApiResponse::ok(check))
}

#[derive(Debug, Deserialize, Default)]
pub struct JobQuery {
    pub id: Option<String>,
    pub queue: Option<String>,
    pub status: Option<String>,
    pub node: Option<String>,
    pub host: Option<String>,
}

fn parse_status(raw: &str) -> NetpulseResult<JobStatus> {
    match raw {
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "finished" => Ok(JobStatus::Finished),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        "stopped" => Ok(JobStatus::Stopped),
        "expired" => Ok(JobStatus::Expired),
        other => Err(NetpulseError::Validation(format!("unknown status '{other}'"))),
    }
}

pub async fn get_jobs(State(state): State<SharedState>, Query(query): Query<JobQuery>) -> Result<ApiResponse<Vec<netpulse_store::model::Job>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let filter = JobFilter {
        id: query.id,
        queue: query.queue,
        status,
        node: query.node,
        host: query.host,
    };
    let jobs = state.dispatcher.query_jobs(filter).await?;
    Ok(ApiResponse::ok(jobs))
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub id: String,
}

pub async fn delete_job(State(state): State<SharedState>, Query(query): Query<CancelQuery>) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state.dispatcher.cancel_job(JobSelector::Id(query.id)).await?;
    Ok(ApiResponse::ok(json!({})))
}

pub async fn get_workers(State(state): State<SharedState>) -> Result<ApiResponse<Vec<netpulse_store::model::WorkerRecord>>, ApiError> {
    let workers = state.store.list_workers().await.map_err(NetpulseError::from)?;
    Ok(ApiResponse::ok(workers))
}

#[derive(Debug, Deserialize)]
pub struct WorkerQuery {
    pub id: String,
}

/// Best-effort: removes the worker's inventory record. The HTTP layer has
/// no channel back into the node supervisor that owns the live task, so
/// this inspects/retires bookkeeping rather than force-killing an in-flight
/// job; see `DESIGN.md` for the reasoning.
pub async fn delete_worker(State(state): State<SharedState>, Query(query): Query<WorkerQuery>) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    state.store.remove_worker(&query.id).await.map_err(NetpulseError::from)?;
    Ok(ApiResponse::ok(json!({})))
}

pub async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_status("queued").unwrap(), JobStatus::Queued);
        assert_eq!(parse_status("expired").unwrap(), JobStatus::Expired);
    }

    #[test]
    fn rejects_unknown_status() {
        let err = parse_status("bogus").unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }
}
