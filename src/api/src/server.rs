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

//! Router assembly and the `serve` entrypoint. `/health` is the one route
//! left outside the API-key `route_layer` — a liveness probe that requires
//! a secret is not a liveness probe.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use netpulse_common::error::{NetpulseError, NetpulseResult};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::routes;
use crate::state::{AppState, SharedState};

pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/device/execute", post(routes::execute))
        .route("/device/bulk", post(routes::bulk))
        .route("/device/test-connection", post(routes::test_connection))
        .route("/job", get(routes::get_jobs).delete(routes::delete_job))
        .route("/worker", get(routes::get_workers).delete(routes::delete_worker))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Binds `addr` and serves `state` until the process is signalled to stop.
/// Graceful shutdown is the caller's concern (see `netpulse` bin's signal
/// handling); this just runs the `axum::serve` future to completion.
pub async fn serve(addr: SocketAddr, state: AppState) -> NetpulseResult<()> {
    let router = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NetpulseError::Other(anyhow::anyhow!("binding {addr}: {e}")))?;
    tracing::info!(%addr, "netpulse api listening");
    axum::serve(listener, router).await.map_err(|e| NetpulseError::Other(anyhow::anyhow!(e)))
}
