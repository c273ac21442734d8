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

//! Everything a handler needs, constructed once at startup and shared via
//! `axum::extract::State`. No global mutable state per the Design Notes'
//! "no global mutable state in the API" allowance: configuration and the
//! store handle are values, passed in explicitly.

use std::sync::Arc;

use netpulse_dispatcher::Dispatcher;
use netpulse_store::traits::JobStoreRef;

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub store: JobStoreRef,
    pub api_key: String,
    pub api_key_header: String,
}

pub type SharedState = Arc<AppState>;
