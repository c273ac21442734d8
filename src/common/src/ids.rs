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

use uuid::Uuid;

pub fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_node_id() -> String {
    format!("node-{}", Uuid::new_v4())
}

/// Queue name for a device's pinned queue. Wire-stable: `pinned_<host>`
/// where `<host>` is the verbatim host string supplied by the client.
pub fn pinned_queue_name(host: &str) -> String {
    format!("pinned_{host}")
}

pub const FIFO_QUEUE: &str = "fifo";

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
