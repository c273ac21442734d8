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

//! Maps [`NetpulseError`] onto an HTTP status and the envelope's `message`.

use axum::response::{IntoResponse, Response};
use netpulse_common::error::{ErrorKind, NetpulseError};

use crate::envelope::ApiResponse;

pub struct ApiError {
    code: u16,
    message: String,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            code: 401,
            message: "missing or invalid API key".to_string(),
        }
    }
}

impl From<NetpulseError> for ApiError {
    fn from(e: NetpulseError) -> Self {
        let code = match e.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::NoCapacity | ErrorKind::Cancelled | ErrorKind::Stopped => 409,
            ErrorKind::Connection | ErrorKind::Driver => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        };
        Self { code, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::error(self.code, self.message).into_response()
    }
}
