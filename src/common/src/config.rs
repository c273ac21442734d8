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

//! Layered configuration: built-in defaults, overridden by an optional TOML
//! file, overridden in turn by `NETPULSE_<SECTION>__<KEY>` environment
//! variables (double underscore joins nested keys, matching the source
//! project's override convention).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetpulseError, NetpulseResult};

const ENV_PREFIX: &str = "NETPULSE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetpulseConfig {
    pub server: ServerConfig,
    pub job: JobConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub node: NodeConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
}

impl Default for NetpulseConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            job: JobConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            node: NodeConfig::default(),
            logging: LoggingConfig::default(),
            plugins: PluginsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub api_key_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            api_key: "change-me".to_string(),
            api_key_header: "X-API-KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Default time a job may sit unclaimed in a queue before it expires.
    pub ttl_secs: u64,
    /// Default upper bound on a single job's execution once claimed.
    pub timeout_secs: u64,
    /// How long a finished job's result stays readable after `ended_at`.
    pub result_retention_secs: u64,
    /// TTL applied to bulk-submitted jobs, which tend to sit longer.
    pub bulk_ttl_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            timeout_secs: 60,
            result_retention_secs: 3600,
            bulk_ttl_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    LeastLoad,
    LoadWeightedRandom,
}

impl Default for SchedulerKind {
    fn default() -> Self {
        SchedulerKind::LeastLoad
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::LeastLoad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Mem,
    Redis,
}

impl Default for StoreBackendKind {
    fn default() -> Self {
        StoreBackendKind::Mem
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    /// `redis://` / `rediss://` endpoints. More than one entry is treated as
    /// a Sentinel quorum when `sentinel_master` is also set.
    pub redis_endpoints: Vec<String>,
    pub sentinel_master: Option<String>,
    pub tls: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Mem,
            redis_endpoints: vec!["redis://127.0.0.1:6379".to_string()],
            sentinel_master: None,
            tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node heartbeat TTL. The supervisor refreshes at `heartbeat_ttl_secs / 3`.
    pub heartbeat_ttl_secs: u64,
    /// Reconcile loop period.
    pub reconcile_interval_secs: u64,
    pub pinned_per_node: usize,
    /// 0 means unbounded (spec default): FIFO workers are not capacity-limited.
    pub fifo_pool_size: usize,
    /// Pinned workers' blocking-dequeue timeout; also the cadence at which
    /// an idle pinned worker re-checks its idle-session deadline.
    pub pinned_block_timeout_secs: u64,
    /// How long a pinned worker may sit idle before closing its cached
    /// device session to free device resources (spec.md §4.5).
    pub pinned_idle_close_after_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl_secs: 15,
            reconcile_interval_secs: 5,
            pinned_per_node: 32,
            fifo_pool_size: 0,
            pinned_block_timeout_secs: 5,
            pinned_idle_close_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub directories: Vec<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directories: vec![],
        }
    }
}

/// Load configuration from an optional TOML file, then apply
/// `NETPULSE_<SECTION>__<KEY>` environment overrides on top.
pub fn load_config(path: Option<&Path>) -> NetpulseResult<NetpulseConfig> {
    let mut value = serde_json::to_value(NetpulseConfig::default())
        .map_err(|e| NetpulseError::Other(anyhow::anyhow!(e)))?;

    if let Some(path) = path {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| NetpulseError::Other(anyhow::anyhow!("reading {:?}: {e}", path)))?;
            let file_value: toml::Value = toml::from_str(&raw)
                .map_err(|e| NetpulseError::Other(anyhow::anyhow!("parsing {:?}: {e}", path)))?;
            let file_json = serde_json::to_value(file_value)
                .map_err(|e| NetpulseError::Other(anyhow::anyhow!(e)))?;
            merge_json(&mut value, file_json);
        }
    }

    apply_env_overrides(&mut value, std::env::vars());

    serde_json::from_value(value).map_err(|e| NetpulseError::Other(anyhow::anyhow!(e)))
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                merge_json(base_map.entry(k).or_insert(serde_json::Value::Null), v);
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Parses `NETPULSE_SECTION__KEY[__SUBKEY...]` env vars and applies them over
/// `value`, which is expected to be a JSON object mirroring [`NetpulseConfig`].
fn apply_env_overrides(value: &mut serde_json::Value, vars: impl Iterator<Item = (String, String)>) {
    let mut overrides: BTreeMap<String, String> = BTreeMap::new();
    for (key, val) in vars {
        if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
            overrides.insert(rest.to_lowercase(), val);
        }
    }

    for (path, raw) in overrides {
        let segments: Vec<&str> = path.split("__").collect();
        set_path(value, &segments, raw);
    }
}

fn set_path(value: &mut serde_json::Value, segments: &[&str], raw: String) {
    let serde_json::Value::Object(map) = value else {
        return;
    };
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.to_string(), parse_scalar(&raw));
    } else {
        let entry = map
            .entry(head.to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        set_path(entry, rest, raw);
    }
}

/// Environment values are strings; coerce to bool/number/array where the
/// shape is unambiguous, otherwise keep them as a JSON string.
fn parse_scalar(raw: &str) -> serde_json::Value {
    if let Ok(b) = raw.parse::<bool>() {
        return serde_json::Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return serde_json::Value::Number(n.into());
    }
    if raw.contains(',') {
        return serde_json::Value::Array(
            raw.split(',')
                .map(|s| serde_json::Value::String(s.trim().to_string()))
                .collect(),
        );
    }
    serde_json::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let cfg = NetpulseConfig::default();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.scheduler.kind, SchedulerKind::LeastLoad);
    }

    #[test]
    fn env_override_nested_key() {
        let mut value = serde_json::to_value(NetpulseConfig::default()).unwrap();
        apply_env_overrides(
            &mut value,
            vec![("NETPULSE_SERVER__PORT".to_string(), "9999".to_string())].into_iter(),
        );
        let cfg: NetpulseConfig = serde_json::from_value(value).unwrap();
        assert_eq!(cfg.server.port, 9999);
    }

    #[test]
    fn env_override_enum_key() {
        let mut value = serde_json::to_value(NetpulseConfig::default()).unwrap();
        apply_env_overrides(
            &mut value,
            vec![(
                "NETPULSE_SCHEDULER__KIND".to_string(),
                "load-weighted-random".to_string(),
            )]
            .into_iter(),
        );
        let cfg: NetpulseConfig = serde_json::from_value(value).unwrap();
        assert_eq!(cfg.scheduler.kind, SchedulerKind::LoadWeightedRandom);
    }

    #[test]
    fn file_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netpulse.toml");
        std::fs::write(&path, "[server]\nport = 8080\n").unwrap();

        std::env::set_var("NETPULSE_SERVER__API_KEY", "from-env");
        let cfg = load_config(Some(&path)).unwrap();
        std::env::remove_var("NETPULSE_SERVER__API_KEY");

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.api_key, "from-env");
    }
}
