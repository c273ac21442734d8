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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error kinds surfaced to clients (job results and HTTP
/// error bodies share this enum so the two never drift apart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NoCapacity,
    Connection,
    Authentication,
    Driver,
    Timeout,
    Cancelled,
    Stopped,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NoCapacity => "no_capacity",
            ErrorKind::Connection => "connection",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Driver => "driver",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Stopped => "stopped",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type NetpulseResult<T> = std::result::Result<T, NetpulseError>;

/// Top-level error type shared by every crate in the workspace.
///
/// Enumerated variants carry an [`ErrorKind`] for client-visible
/// classification; `Other` is the opaque escape hatch for failures that
/// never reach a client (config/bootstrap errors and the like).
#[derive(Error, Debug)]
pub enum NetpulseError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no node has spare pinned capacity")]
    NoCapacity,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("job was cancelled")]
    Cancelled,

    #[error("job was stopped")]
    Stopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NetpulseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetpulseError::Validation(_) => ErrorKind::Validation,
            NetpulseError::NoCapacity => ErrorKind::NoCapacity,
            NetpulseError::Connection(_) => ErrorKind::Connection,
            NetpulseError::Authentication(_) => ErrorKind::Authentication,
            NetpulseError::Driver(_) => ErrorKind::Driver,
            NetpulseError::Timeout(_) => ErrorKind::Timeout,
            NetpulseError::Cancelled => ErrorKind::Cancelled,
            NetpulseError::Stopped => ErrorKind::Stopped,
            NetpulseError::Other(_) => ErrorKind::Internal,
        }
    }
}
