// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Request and response envelopes shared by every transport.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::{BuildInput, CacheStrategy};
use crate::codec::{Argument, EncodedValue};
use crate::locator::{Locator, RecoveryStrategy};

/// Tree-build parameters of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceSpec {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Defaults to the server's configured strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStrategy>,
}

impl SourceSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), args: Vec::new(), cache: None }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache(mut self, cache: CacheStrategy) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build_input(&self) -> BuildInput {
        BuildInput::new(self.text.clone(), self.args.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeQuery {
    /// Evaluate `property` on the node at `locator`.
    Evaluate {
        #[serde(default)]
        locator: Locator,
        property: String,
        #[serde(default)]
        args: Vec<Argument>,
    },
    /// Properties the frontend exposes on the node at `locator`.
    ListProperties {
        #[serde(default)]
        locator: Locator,
    },
    /// Nodes whose span contains `offset`, innermost first.
    ListNodes { offset: u32 },
    /// The subtree at `locator` as nested node references.
    ListTree {
        #[serde(default)]
        locator: Locator,
    },
}

impl ProbeQuery {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Evaluate { .. } => "evaluate",
            Self::ListProperties { .. } => "list_properties",
            Self::ListNodes { .. } => "list_nodes",
            Self::ListTree { .. } => "list_tree",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestEnvelope {
    pub id: u64,
    pub source: SourceSpec,
    /// Defaults to the server's configured strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryStrategy>,
    pub query: ProbeQuery,
}

impl RequestEnvelope {
    pub fn evaluate(
        id: u64,
        source: SourceSpec,
        locator: Locator,
        property: impl Into<String>,
        args: Vec<Argument>,
    ) -> Self {
        Self {
            id,
            source,
            recovery: None,
            query: ProbeQuery::Evaluate { locator, property: property.into(), args },
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    NodeNotFound,
    ArgumentDecode,
    Invocation,
    Internal,
    /// Malformed envelope, rejected before dispatch.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RequestStats {
    pub generation: u64,
    pub reused_tree: bool,
    pub parse_micros: u64,
    pub invoke_micros: u64,
    pub resets: u64,
}

/// Exactly one of `body` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseEnvelope {
    /// `None` only when the request id could not be read.
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<EncodedValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RequestStats>,
}

impl ResponseEnvelope {
    pub fn success(id: u64, body: Vec<EncodedValue>) -> Self {
        Self { id: Some(id), body: Some(body), error: None, messages: Vec::new(), stats: None }
    }

    pub fn failure(id: Option<u64>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            body: None,
            error: Some(ErrorBody { kind, message: message.into() }),
            messages: Vec::new(),
            stats: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::locator::Step;

    #[test]
    fn request_defaults_are_optional() {
        let request: RequestEnvelope = serde_json::from_value(json!({
            "id": 3,
            "source": { "text": "1 + 2" },
            "query": { "kind": "evaluate", "property": "value" }
        }))
        .expect("minimal request");
        assert_eq!(request.recovery, None);
        assert_eq!(request.source.cache, None);
        assert_eq!(
            request.query,
            ProbeQuery::Evaluate { locator: Locator::root(), property: "value".into(), args: vec![] }
        );
    }

    #[test]
    fn full_request_wire_form() {
        let request = RequestEnvelope::evaluate(
            7,
            SourceSpec::new("x * 2").with_args(["x=21"]).with_cache(CacheStrategy::None),
            Locator::new(vec![Step::new("Stmt", 0)]),
            "timesTwo",
            vec![Argument::int(21)],
        )
        .with_recovery(RecoveryStrategy::Fail);
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({
                "id": 7,
                "source": { "text": "x * 2", "args": ["x=21"], "cache": "NONE" },
                "recovery": "fail",
                "query": {
                    "kind": "evaluate",
                    "locator": { "steps": [{ "typeName": "Stmt", "childIndex": 0 }] },
                    "property": "timesTwo",
                    "args": [{ "type": "int", "value": 21 }]
                }
            })
        );
    }

    #[test]
    fn error_response_omits_body() {
        let response = ResponseEnvelope::failure(None, ErrorKind::Transport, "bad json");
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({ "id": null, "error": { "kind": "transport", "message": "bad json" } })
        );
    }

    #[test]
    fn other_query_kinds_parse() {
        let query: ProbeQuery =
            serde_json::from_value(json!({ "kind": "list_nodes", "offset": 4 })).expect("parse");
        assert_eq!(query, ProbeQuery::ListNodes { offset: 4 });
        assert_eq!(query.kind(), "list_nodes");
        let query: ProbeQuery =
            serde_json::from_value(json!({ "kind": "list_tree" })).expect("parse");
        assert_eq!(query, ProbeQuery::ListTree { locator: Locator::root() });
    }
}
