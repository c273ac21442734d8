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

//! The REST surface (excluded from the core per spec.md §1, implemented
//! here as a thin real collaborator): response envelope, API-key auth
//! middleware, request DTOs, route handlers, and router assembly.

pub mod auth;
pub mod dto;
pub mod envelope;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, serve};
pub use state::AppState;
