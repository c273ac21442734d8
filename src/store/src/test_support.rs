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

//! Fixtures shared by this crate's tests and by downstream crates exercising
//! `MemStore` as a dev-dependency.

use netpulse_common::ids::{new_job_id, now_ms};

use crate::model::{DeviceFingerprint, Job, JobStatus, OperationKind, Payload};

pub fn sample_job(host: &str, queue: &str) -> Job {
    Job {
        id: new_job_id(),
        driver: "mock".to_string(),
        operation: OperationKind::Execute,
        device: DeviceFingerprint {
            host: host.to_string(),
            port: None,
            driver: "mock".to_string(),
            connection_args: serde_json::json!({}),
            credential_ref: None,
        },
        payload: Payload::Command("show version".to_string()),
        queue: queue.to_string(),
        status: JobStatus::Queued,
        created_at: now_ms(),
        started_at: None,
        ended_at: None,
        ttl_secs: 300,
        timeout_secs: 60,
        result_retention_secs: 3600,
        result: None,
        cancel_requested: false,
        node_id: None,
    }
}
