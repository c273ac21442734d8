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

//! Template-rendering and output-parsing hooks. Out of scope as real
//! engines (Jinja2-like templating, TextFSM-like parsing); the worker only
//! needs something implementing these two traits to turn a `ConfigContext`
//! payload into `ConfigText` before it reaches a driver, and optionally to
//! reshape a driver's raw output before it lands in a job result.

use netpulse_common::error::{NetpulseError, NetpulseResult};
use serde_json::Value as JsonValue;

pub trait RenderHook: Send + Sync {
    fn render(&self, template: &str, context: &JsonValue) -> NetpulseResult<String>;
}

pub trait ParseHook: Send + Sync {
    fn parse(&self, raw: &str, template: &str) -> NetpulseResult<JsonValue>;
}

/// Treats `context` as a flat string map and does `{{key}}` substitution.
/// Good enough to exercise the `ConfigContext -> ConfigText` pipeline; a
/// real Jinja2-compatible engine is an external collaborator.
pub struct PassThroughRenderer;

impl RenderHook for PassThroughRenderer {
    fn render(&self, template: &str, context: &JsonValue) -> NetpulseResult<String> {
        let map = context
            .as_object()
            .ok_or_else(|| NetpulseError::Validation("render context must be a JSON object".into()))?;
        let mut out = template.to_string();
        for (key, value) in map {
            let needle = format!("{{{{{key}}}}}");
            let replacement = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&needle, &replacement);
        }
        Ok(out)
    }
}

/// Returns the raw text unparsed, wrapped as `{"raw": "..."}`. Stands in
/// for a TextFSM/Genie-like structured parser.
pub struct PassThroughParser;

impl ParseHook for PassThroughParser {
    fn parse(&self, raw: &str, _template: &str) -> NetpulseResult<JsonValue> {
        Ok(serde_json::json!({ "raw": raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_flat_context_keys() {
        let ctx = serde_json::json!({ "vlan": 10, "name": "uplink" });
        let rendered = PassThroughRenderer.render("interface vlan{{vlan}}\n description {{name}}", &ctx).unwrap();
        assert_eq!(rendered, "interface vlan10\n description uplink");
    }

    #[test]
    fn rejects_non_object_context() {
        let ctx = serde_json::json!([1, 2, 3]);
        assert!(PassThroughRenderer.render("{{x}}", &ctx).is_err());
    }
}
