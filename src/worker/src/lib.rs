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

//! Worker runtime (C5): pinned and FIFO workers sharing a common loop.
//! Both variants are tokio tasks, not OS processes — the node supervisor
//! spawns and reaps them as `JoinHandle`s, isolating a panicking job inside
//! one worker from the rest of the node (see `netpulse_supervisor`).

pub mod runtime;
pub mod session_cache;

use std::sync::Arc;

use netpulse_driver::credentials::CredentialProvider;
use netpulse_driver::registry::Registry;
use netpulse_driver::render::{ParseHook, RenderHook};
use netpulse_store::traits::JobStoreRef;

/// Everything a worker needs that does not change across the jobs it
/// processes. Cheaply cloneable; every spawned worker task gets its own
/// copy.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: JobStoreRef,
    pub drivers: Arc<Registry>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub render: Arc<dyn RenderHook>,
    pub parse: Arc<dyn ParseHook>,
}

pub use runtime::{run_fifo_worker, run_pinned_worker, WorkerHandle};
