// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Wire encoding of evaluation results and decoding of probe arguments.
//!
//! Results travel as a flat sequence of [`EncodedValue`]s: text is split into one `plain` value
//! per line, nodes become `node` references carrying a fresh [`Locator`], collections become
//! `compound` values. Arguments travel as typed [`Argument`]s and are decoded against the tree
//! the probe is about to run on.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locator::{Locator, RecoveryStrategy, ResolveError};
use crate::model::{HostValue, NodeId, Tree};

/// Substituted for a collection that (transitively) contains itself.
pub const CYCLE_MARKER: &str = "<cycle>";

pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncodedValue {
    Plain { text: String },
    Node { locator: Locator, label: String },
    Compound { items: Vec<EncodedValue> },
    Error { text: String },
}

impl EncodedValue {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::Plain { text } => Some(text),
            _ => None,
        }
    }
}

/// Encodes `value` with the default depth limit.
pub fn encode(tree: &Tree, value: &HostValue) -> Vec<EncodedValue> {
    Encoder::new(tree).encode(value)
}

/// Splits text on `\n` and `\r\n`, dropping the separators.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> + '_ {
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut breaks = memchr::memchr_iter(b'\n', bytes);
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let (end, next) = match breaks.next() {
            Some(newline) => (newline, newline + 1),
            None => {
                done = true;
                (bytes.len(), bytes.len())
            }
        };
        let line = &text[start..end];
        start = next;
        Some(line.strip_suffix('\r').filter(|_| !done).unwrap_or(line))
    })
}

pub struct Encoder<'t> {
    tree: &'t Tree,
    max_depth: usize,
}

impl<'t> Encoder<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self { tree, max_depth: DEFAULT_MAX_DEPTH }
    }

    /// Nesting depth after which compound values are replaced by an error marker.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn encode(&self, value: &HostValue) -> Vec<EncodedValue> {
        let mut out = Vec::new();
        let mut visiting = HashSet::new();
        self.encode_into(value, &mut visiting, 0, &mut out);
        out
    }

    /// Encodes a reference to `node`, or an error marker if it is not part of the tree.
    pub fn node_ref(&self, node: NodeId) -> EncodedValue {
        match Locator::create(self.tree, node) {
            Some(locator) => EncodedValue::Node { locator, label: self.tree.label(node) },
            None => EncodedValue::error(format!("node {node} is not part of the current tree")),
        }
    }

    /// Encodes the subtree at `node` as `compound[node, child subtrees...]`.
    pub fn subtree(&self, node: NodeId) -> EncodedValue {
        self.subtree_at(node, 0)
    }

    fn subtree_at(&self, node: NodeId, depth: usize) -> EncodedValue {
        if depth >= self.max_depth {
            return EncodedValue::error(format!(
                "tree nested deeper than {} levels",
                self.max_depth
            ));
        }
        let mut items = vec![self.node_ref(node)];
        items.extend(self.tree.children(node).iter().map(|child| self.subtree_at(*child, depth + 1)));
        EncodedValue::Compound { items }
    }

    fn encode_into(
        &self,
        value: &HostValue,
        visiting: &mut HashSet<usize>,
        depth: usize,
        out: &mut Vec<EncodedValue>,
    ) {
        match value {
            HostValue::Null => out.push(EncodedValue::plain("null")),
            HostValue::Bool(value) => {
                out.push(EncodedValue::plain(if *value { "true" } else { "false" }))
            }
            HostValue::Int(value) => {
                out.push(EncodedValue::plain(itoa::Buffer::new().format(*value)))
            }
            HostValue::Float(value) => out.push(EncodedValue::plain(value.to_string())),
            HostValue::Text(text) => push_lines(text, out),
            HostValue::Custom(display) => push_lines(&display.to_string(), out),
            HostValue::Node(node) => out.push(self.node_ref(*node)),
            HostValue::List(list) => {
                if depth >= self.max_depth {
                    out.push(EncodedValue::error(format!(
                        "value nested deeper than {} levels",
                        self.max_depth
                    )));
                    return;
                }
                // Identities on the current path only; shared (non-cyclic) elements still encode.
                let identity = list.identity();
                if !visiting.insert(identity) {
                    out.push(EncodedValue::error(CYCLE_MARKER));
                    return;
                }
                let mut items = Vec::new();
                for item in list.snapshot() {
                    self.encode_into(&item, visiting, depth + 1, &mut items);
                }
                visiting.remove(&identity);
                out.push(EncodedValue::Compound { items });
            }
        }
    }
}

fn push_lines(text: &str, out: &mut Vec<EncodedValue>) {
    out.extend(split_lines(text).map(EncodedValue::plain));
}

/// Declared type of a probe argument or property parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    Text,
    Int,
    Bool,
    Node,
}

impl ArgumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Node => "node",
        }
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArgumentKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "string" => Ok(Self::Text),
            "int" | "integer" => Ok(Self::Int),
            "bool" | "boolean" => Ok(Self::Bool),
            "node" => Ok(Self::Node),
            other => Err(DecodeError::UnknownType(other.to_owned())),
        }
    }
}

/// A serialized probe argument: a declared type tag plus a JSON value.
///
/// The tag is kept as a string so that unknown tags reach the decoder and fail with a
/// descriptive reason instead of a generic envelope error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Argument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl Argument {
    pub fn new(kind: ArgumentKind, value: Value) -> Self {
        Self { kind: kind.as_str().to_owned(), value }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(ArgumentKind::Text, Value::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ArgumentKind::Int, Value::from(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ArgumentKind::Bool, Value::Bool(value))
    }

    pub fn node(locator: Option<&Locator>) -> Self {
        let value = match locator {
            Some(locator) => serde_json::to_value(locator).unwrap_or(Value::Null),
            None => Value::Null,
        };
        Self::new(ArgumentKind::Node, value)
    }

    /// Rebuilds an argument of `kind` from values previously produced by [`encode`].
    ///
    /// Text re-joins `plain` lines with `\n`; other kinds expect exactly one value.
    pub fn from_encoded(kind: ArgumentKind, encoded: &[EncodedValue]) -> Option<Self> {
        match (kind, encoded) {
            (ArgumentKind::Text, lines) => {
                let lines = lines.iter().map(EncodedValue::as_plain).collect::<Option<Vec<_>>>()?;
                Some(Self::text(lines.join("\n")))
            }
            (ArgumentKind::Int | ArgumentKind::Bool, [EncodedValue::Plain { text }]) => {
                Some(Self::new(kind, Value::String(text.clone())))
            }
            (ArgumentKind::Node, [EncodedValue::Node { locator, .. }]) => {
                Some(Self::node(Some(locator)))
            }
            (ArgumentKind::Node, [EncodedValue::Plain { text }]) if text == "null" => {
                Some(Self::node(None))
            }
            _ => None,
        }
    }
}

/// A decoded argument, ready to be passed to a frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Text(String),
    Int(i64),
    Bool(bool),
    /// `None` stands for an explicit "no node" argument.
    Node(Option<NodeId>),
}

impl ParameterValue {
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Self::Text(_) => ArgumentKind::Text,
            Self::Int(_) => ArgumentKind::Int,
            Self::Bool(_) => ArgumentKind::Bool,
            Self::Node(_) => ArgumentKind::Node,
        }
    }
}

/// Tree and recovery policy that node-typed arguments are bound against.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'t> {
    pub tree: &'t Tree,
    pub recovery: RecoveryStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown argument type `{0}` (expected text, int, bool or node)")]
    UnknownType(String),
    #[error("invalid {kind} value: {reason}")]
    InvalidValue { kind: ArgumentKind, reason: String },
    #[error("argument node could not be located, probe is stale ({0})")]
    NodeNotFound(ResolveError),
}

pub fn decode(argument: &Argument, cx: &DecodeContext<'_>) -> Result<ParameterValue, DecodeError> {
    let kind = argument.kind.parse::<ArgumentKind>()?;
    let invalid = |reason: String| DecodeError::InvalidValue { kind, reason };
    match kind {
        ArgumentKind::Text => match &argument.value {
            Value::String(text) => Ok(ParameterValue::Text(text.clone())),
            Value::Null => Ok(ParameterValue::Text(String::new())),
            other => Err(invalid(format!("expected a string, got {other}"))),
        },
        ArgumentKind::Int => match &argument.value {
            Value::Number(number) => number
                .as_i64()
                .map(ParameterValue::Int)
                .ok_or_else(|| invalid(format!("{number} is not a 64-bit integer"))),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(ParameterValue::Int)
                .map_err(|err| invalid(format!("{text:?}: {err}"))),
            other => Err(invalid(format!("expected an integer, got {other}"))),
        },
        ArgumentKind::Bool => match &argument.value {
            Value::Bool(value) => Ok(ParameterValue::Bool(*value)),
            Value::String(text) => match text.trim() {
                "true" => Ok(ParameterValue::Bool(true)),
                "false" => Ok(ParameterValue::Bool(false)),
                _ => Err(invalid(format!("{text:?} is neither true nor false"))),
            },
            other => Err(invalid(format!("expected a boolean, got {other}"))),
        },
        ArgumentKind::Node => {
            if argument.value.is_null() {
                return Ok(ParameterValue::Node(None));
            }
            let locator = Locator::deserialize(&argument.value)
                .map_err(|err| invalid(format!("malformed locator: {err}")))?;
            locator
                .resolve(cx.tree, cx.recovery)
                .map(|node| ParameterValue::Node(Some(node)))
                .map_err(DecodeError::NodeNotFound)
        }
    }
}
