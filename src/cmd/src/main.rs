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

//! The `netpulse` binary: one executable, three subcommands. `api` runs
//! the dispatcher behind the HTTP surface; `node` runs a node supervisor
//! and its pinned/FIFO workers; `all-in-one` runs both in a single process
//! for local development, mirroring the teacher's single-binary
//! `cmd_all`-style entrypoint layered under `clap::Parser` flags for the
//! handful of settings an operator sets most often, with everything else
//! coming from the richer layered file/env config.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netpulse_common::config::{load_config, NetpulseConfig, SchedulerKind, StoreBackendKind};
use netpulse_dispatcher::Dispatcher;
use netpulse_driver::credentials::{CredentialProvider, EnvCredentialProvider};
use netpulse_driver::registry::Registry;
use netpulse_driver::render::{ParseHook, PassThroughParser, PassThroughRenderer, RenderHook};
use netpulse_scheduler::Scheduler;
use netpulse_store::mem::new_mem_store;
use netpulse_store::redis::RedisStore;
use netpulse_store::traits::JobStoreRef;
use netpulse_supervisor::{Supervisor, SupervisorConfig};
use netpulse_worker::WorkerContext;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "netpulse", about = "Distributed job dispatch and connection locality for network device automation")]
struct Cli {
    /// Path to a TOML config file; `NETPULSE_<SECTION>__<KEY>` env vars
    /// layer on top regardless of whether this is set.
    #[arg(long, env = "NETPULSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP dispatcher surface (C2/C3 behind axum).
    Api {
        #[arg(long, env = "NETPULSE_LISTEN_ADDR")]
        listen_addr: Option<String>,
    },
    /// Run a node supervisor and its pinned/FIFO worker population (C4/C5).
    Node {
        #[arg(long, env = "NETPULSE_NODE_ID")]
        node_id: Option<String>,
    },
    /// Run the API surface and a node supervisor in one process, for local
    /// development and the end-to-end scenarios in spec.md §8.
    AllInOne {
        #[arg(long, env = "NETPULSE_LISTEN_ADDR")]
        listen_addr: Option<String>,
        #[arg(long, env = "NETPULSE_NODE_ID")]
        node_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;
    netpulse_common::logging::init_tracing(&config.logging.level);

    match cli.command {
        Command::Api { listen_addr } => run_api(config, listen_addr).await,
        Command::Node { node_id } => run_node(config, node_id).await,
        Command::AllInOne { listen_addr, node_id } => run_all_in_one(config, listen_addr, node_id).await,
    }
}

async fn build_store(config: &NetpulseConfig) -> Result<JobStoreRef> {
    match config.store.backend {
        StoreBackendKind::Mem => Ok(new_mem_store()),
        StoreBackendKind::Redis => {
            let endpoint = config
                .store
                .redis_endpoints
                .first()
                .context("store.backend = redis requires at least one redis_endpoints entry")?;
            if config.store.sentinel_master.is_some() && config.store.redis_endpoints.len() > 1 {
                tracing::warn!("multiple redis_endpoints with sentinel_master set; connecting to the first endpoint only (sentinel quorum dialing is not yet implemented)");
            }
            let store = RedisStore::connect(endpoint).await.context("connecting to redis store backend")?;
            Ok(Arc::new(store))
        }
    }
}

fn build_scheduler(config: &NetpulseConfig, store: JobStoreRef) -> Scheduler {
    match config.scheduler.kind {
        SchedulerKind::LeastLoad => Scheduler::least_load(store),
        SchedulerKind::LoadWeightedRandom => Scheduler::load_weighted_random(store),
    }
}

fn build_credentials() -> Arc<dyn CredentialProvider> {
    Arc::new(EnvCredentialProvider::default())
}

fn build_render_hooks() -> (Arc<dyn RenderHook>, Arc<dyn ParseHook>) {
    (Arc::new(PassThroughRenderer), Arc::new(PassThroughParser))
}

async fn run_api(config: NetpulseConfig, listen_addr_override: Option<String>) -> Result<()> {
    let store = build_store(&config).await?;
    let scheduler = Arc::new(build_scheduler(&config, store.clone()));
    let drivers = Arc::new(Registry::with_builtin_drivers().context("registering builtin drivers")?);
    let credentials = build_credentials();

    let dispatcher = Dispatcher::new(store.clone(), scheduler, drivers, credentials, config.job.clone());
    let state = netpulse_api::AppState {
        dispatcher,
        store,
        api_key: config.server.api_key.clone(),
        api_key_header: config.server.api_key_header.clone(),
    };

    let addr = resolve_listen_addr(&config, listen_addr_override)?;
    netpulse_api::serve(addr, state).await.map_err(|e| anyhow::anyhow!(e))
}

async fn run_node(config: NetpulseConfig, node_id_override: Option<String>) -> Result<()> {
    let store = build_store(&config).await?;
    let drivers = Arc::new(Registry::with_builtin_drivers().context("registering builtin drivers")?);
    let credentials = build_credentials();
    let (render, parse) = build_render_hooks();

    let worker_ctx = WorkerContext {
        store: store.clone(),
        drivers,
        credentials,
        render,
        parse,
    };

    let node_id = node_id_override.unwrap_or_else(netpulse_common::ids::new_node_id);
    let supervisor = Supervisor::new(node_id.clone(), store, worker_ctx, supervisor_config(&config));

    info!(node_id = %node_id, "starting node supervisor");
    let (join, shutdown_tx) = supervisor.start().await.map_err(|e| anyhow::anyhow!(e))?;

    wait_for_shutdown_signal().await;
    info!(node_id = %node_id, "shutdown requested, draining");
    let _ = shutdown_tx.send(());
    join.await.context("node supervisor task panicked")?;
    Ok(())
}

async fn run_all_in_one(config: NetpulseConfig, listen_addr_override: Option<String>, node_id_override: Option<String>) -> Result<()> {
    let store = build_store(&config).await?;
    let scheduler = Arc::new(build_scheduler(&config, store.clone()));
    let drivers = Arc::new(Registry::with_builtin_drivers().context("registering builtin drivers")?);
    let credentials = build_credentials();
    let (render, parse) = build_render_hooks();

    let dispatcher = Dispatcher::new(store.clone(), scheduler, drivers.clone(), credentials.clone(), config.job.clone());
    let state = netpulse_api::AppState {
        dispatcher,
        store: store.clone(),
        api_key: config.server.api_key.clone(),
        api_key_header: config.server.api_key_header.clone(),
    };
    let addr = resolve_listen_addr(&config, listen_addr_override)?;

    let worker_ctx = WorkerContext {
        store: store.clone(),
        drivers,
        credentials,
        render,
        parse,
    };
    let node_id = node_id_override.unwrap_or_else(netpulse_common::ids::new_node_id);
    let supervisor = Supervisor::new(node_id.clone(), store, worker_ctx, supervisor_config(&config));
    let (join, shutdown_tx) = supervisor.start().await.map_err(|e| anyhow::anyhow!(e))?;

    info!(node_id = %node_id, %addr, "running api + node supervisor in one process");
    tokio::select! {
        result = netpulse_api::serve(addr, state) => {
            result.map_err(|e| anyhow::anyhow!(e))?;
        }
        _ = wait_for_shutdown_signal() => {
            info!(node_id = %node_id, "shutdown requested, draining");
        }
    }

    let _ = shutdown_tx.send(());
    join.await.context("node supervisor task panicked")?;
    Ok(())
}

fn supervisor_config(config: &NetpulseConfig) -> SupervisorConfig {
    SupervisorConfig {
        hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
        pid: std::process::id(),
        capacity: config.node.pinned_per_node,
        heartbeat_ttl: Duration::from_secs(config.node.heartbeat_ttl_secs),
        reconcile_interval: Duration::from_secs(config.node.reconcile_interval_secs),
        fifo_pool_size: config.node.fifo_pool_size,
        pinned_block_timeout: Duration::from_secs(config.node.pinned_block_timeout_secs),
        pinned_idle_close_after: Duration::from_secs(config.node.pinned_idle_close_after_secs),
    }
}

fn resolve_listen_addr(config: &NetpulseConfig, override_addr: Option<String>) -> Result<SocketAddr> {
    let raw = override_addr.unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    raw.parse().with_context(|| format!("invalid listen address '{raw}'"))
}

async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
