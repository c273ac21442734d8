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

//! Static API-key auth (§6): the configured key must appear in the
//! configured header, as a query parameter, or as a cookie — any one of the
//! three satisfies the request, all three keyed off the same configurable
//! name (default `X-API-KEY`).

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::SharedState;

pub async fn require_api_key(State(state): State<SharedState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let presented = from_header(request.headers(), &state.api_key_header)
        .or_else(|| from_query(request.uri().query().unwrap_or(""), &state.api_key_header))
        .or_else(|| from_cookie(request.headers(), &state.api_key_header));

    match presented {
        Some(value) if value == state.api_key => Ok(next.run(request).await),
        _ => Err(ApiError::unauthorized()),
    }
}

fn from_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_string)
}

fn from_query(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.eq_ignore_ascii_case(name)).then(|| urlencoded_decode(value))
    })
}

fn from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        key.eq_ignore_ascii_case(name).then(|| value.to_string())
    })
}

/// Minimal `%XX` + `+` decoding, sufficient for an API key (no reserved
/// `&`/`=` characters expected inside the value itself).
fn urlencoded_decode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                match (hi.and_then(|c| c.to_digit(16)), lo.and_then(|c| c.to_digit(16))) {
                    (Some(hi), Some(lo)) => out.push(((hi * 16 + lo) as u8) as char),
                    _ => out.push('%'),
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_query_case_insensitively() {
        assert_eq!(from_query("x-api-key=secret&other=1", "X-API-KEY"), Some("secret".to_string()));
        assert_eq!(from_query("other=1", "X-API-KEY"), None);
    }

    #[test]
    fn extracts_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, "session=abc; X-API-KEY=secret".parse().unwrap());
        assert_eq!(from_cookie(&headers, "X-API-KEY"), Some("secret".to_string()));
    }

    #[test]
    fn decodes_percent_encoded_query_value() {
        assert_eq!(from_query("X-API-KEY=a%2Bb", "X-API-KEY"), Some("a+b".to_string()));
    }
}
