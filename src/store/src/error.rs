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

use netpulse_common::error::NetpulseError;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("cas conflict: {0}")]
    CasConflict(String),
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for NetpulseError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => NetpulseError::Other(anyhow::anyhow!("not found")),
            StoreError::CasConflict(msg) => NetpulseError::Other(anyhow::anyhow!(msg)),
            StoreError::Backend(e) => NetpulseError::Other(e),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(anyhow::anyhow!(e))
    }
}
