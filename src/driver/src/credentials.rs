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

//! The credential-provider contract (§6): `resolve(ref) -> secret`, with
//! short-TTL caching permitted inside the worker process. This crate ships
//! one real implementation, backed by environment variables, sufficient to
//! exercise the contract end-to-end; a Vault-like provider is external.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netpulse_common::error::{NetpulseError, NetpulseResult};

#[derive(Debug, Clone, Default)]
pub struct Secret {
    pub username: String,
    pub password: String,
    pub extra: serde_json::Value,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, reference: &str) -> NetpulseResult<Secret>;
}

struct CacheEntry {
    secret: Secret,
    fetched_at: Instant,
}

/// Resolves `reference` to the pair of environment variables
/// `NETPULSE_CRED_<REF>_USERNAME` / `_PASSWORD`, cached for `ttl`.
pub struct EnvCredentialProvider {
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl EnvCredentialProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, reference: &str) -> NetpulseResult<Secret> {
        if let Some(entry) = self.cache.read().unwrap().get(reference) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.secret.clone());
            }
        }

        let key = reference.to_uppercase().replace(['-', '.'], "_");
        let username = std::env::var(format!("NETPULSE_CRED_{key}_USERNAME"))
            .map_err(|_| NetpulseError::Validation(format!("no credential registered for reference '{reference}'")))?;
        let password = std::env::var(format!("NETPULSE_CRED_{key}_PASSWORD")).unwrap_or_default();

        let secret = Secret {
            username,
            password,
            extra: serde_json::Value::Null,
        };
        self.cache.write().unwrap().insert(
            reference.to_string(),
            CacheEntry {
                secret: secret.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_from_environment() {
        std::env::set_var("NETPULSE_CRED_LAB1_USERNAME", "admin");
        std::env::set_var("NETPULSE_CRED_LAB1_PASSWORD", "hunter2");
        let provider = EnvCredentialProvider::default();
        let secret = provider.resolve("lab1").await.unwrap();
        assert_eq!(secret.username, "admin");
        assert_eq!(secret.password, "hunter2");
        std::env::remove_var("NETPULSE_CRED_LAB1_USERNAME");
        std::env::remove_var("NETPULSE_CRED_LAB1_PASSWORD");
    }

    #[tokio::test]
    async fn missing_reference_is_validation_error() {
        let provider = EnvCredentialProvider::default();
        let err = provider.resolve("does-not-exist").await.unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }
}
