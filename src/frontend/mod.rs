// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The capability surface a language frontend hands to the probe server.
//!
//! A frontend parses source into a [`Tree`], evaluates named computed properties on its nodes,
//! and optionally resets memoized property state. The server never assumes anything else about
//! how a frontend works.

pub mod calc;

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;

use crate::codec::{ArgumentKind, ParameterValue};
use crate::model::{HostValue, NodeId, Span, Tree};

pub use calc::CalcFrontend;

pub trait Frontend: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Builds a fresh tree. Memo tables of the returned tree must be empty.
    fn parse(&self, source: &str, args: &[String]) -> Result<Tree, ParseError>;

    /// Evaluates `property` on `node`. May populate memo tables anywhere in `tree`.
    fn invoke(
        &self,
        tree: &mut Tree,
        node: NodeId,
        property: &str,
        args: &[ParameterValue],
        cx: &mut InvocationContext,
    ) -> Result<HostValue, InvocationError>;

    /// Drops memoized state of `node`. Only called for nodes with a populated memo table.
    fn reset(&self, tree: &mut Tree, node: NodeId) {
        if let Some(memo) = tree.memo_mut(node) {
            memo.clear();
        }
    }

    /// Properties that can be probed on `node`.
    fn properties(&self, tree: &Tree, node: NodeId) -> Vec<PropertyInfo> {
        let _ = (tree, node);
        Vec::new()
    }
}

/// Looks up a built-in frontend by name.
pub fn builtin(name: &str) -> Option<Arc<dyn Frontend>> {
    match name {
        "calc" => Some(Arc::new(CalcFrontend::default())),
        _ => None,
    }
}

/// Side channel for diagnostics a frontend wants to surface with the probe result.
#[derive(Debug, Default)]
pub struct InvocationContext {
    messages: Vec<String>,
}

impl InvocationContext {
    pub fn emit(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PropertyInfo {
    pub name: String,
    pub params: Vec<ArgumentKind>,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = ArgumentKind>) -> Self {
        Self { name: name.into(), params: params.into_iter().collect() }
    }
}

impl fmt::Display for PropertyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", .span.map(|span| format!(" at {span}")).unwrap_or_default())]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), span: None }
    }

    pub fn at(message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span: Some(span) }
    }
}

/// Error raised by the frontend while evaluating a property; surfaced to clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvocationError {
    pub message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
