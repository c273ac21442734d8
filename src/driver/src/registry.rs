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

//! Resolves a device's `driver` name to a concrete [`Driver`] instance. The
//! source's plugin directory is re-expressed as a registry populated once
//! at startup rather than scanned from disk on every job.

use std::collections::HashMap;
use std::sync::Arc;

use netpulse_common::error::{NetpulseError, NetpulseResult};

use crate::http::HttpDriver;
use crate::mock::MockDriver;
use crate::ssh::SshDriver;
use crate::Driver;

#[derive(Clone)]
pub struct Registry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { drivers: HashMap::new() }
    }

    /// Registers the drivers shipped alongside this crate: `mock`, `ssh`,
    /// and `restconf`. A deployment wiring in a real plugin system would
    /// call `register` additionally, not instead.
    pub fn with_builtin_drivers() -> NetpulseResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(MockDriver::default()));
        registry.register(Arc::new(SshDriver::default()));
        registry.register(Arc::new(HttpDriver::new()?));
        Ok(registry)
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn resolve(&self, name: &str) -> NetpulseResult<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| NetpulseError::Validation(format!("unknown driver '{name}'")))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_drivers_resolve_by_name() {
        let registry = Registry::with_builtin_drivers().unwrap();
        assert_eq!(registry.resolve("mock").unwrap().name(), "mock");
        assert_eq!(registry.resolve("ssh").unwrap().name(), "ssh");
        assert_eq!(registry.resolve("restconf").unwrap().name(), "restconf");
    }

    #[test]
    fn unknown_driver_is_a_validation_error() {
        let registry = Registry::with_builtin_drivers().unwrap();
        let err = registry.resolve("not-a-driver").unwrap_err();
        assert_eq!(err.kind(), netpulse_common::error::ErrorKind::Validation);
    }
}
