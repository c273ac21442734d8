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

//! The job store (C1): queues, per-job state, the host→node binding
//! registry, and node/worker records. Any backend implementing
//! [`traits::JobStore`] can serve; [`mem::MemStore`] and [`redis::RedisStore`]
//! are the two shipped here.

pub mod error;
pub mod mem;
pub mod model;
pub mod redis;
pub mod test_support;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use traits::{HeartbeatFields, JobStore, JobStoreRef, JobUpdate};
