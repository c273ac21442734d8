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

//! The device session a worker holds while handling a job. A pinned worker
//! keeps one of these alive across jobs as long as consecutive jobs target
//! the same host and driver; a FIFO worker tears it down the moment the job
//! that opened it finishes, so two jobs never share a connection even when
//! they target the same host.

use std::time::Instant;

use netpulse_driver::Session;

pub struct CachedSession {
    pub host: String,
    pub driver_name: String,
    pub session: Box<dyn Session>,
    pub last_used: Instant,
}

impl CachedSession {
    pub fn matches(&self, host: &str, driver_name: &str) -> bool {
        self.host == host && self.driver_name == driver_name
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_used.elapsed()
    }
}
