// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Stable, serializable node addresses.
//!
//! A [`Locator`] records the `(type, child index)` path from the root to a node. Applying it to
//! the tree it came from always lands on the same node. Applying it to a rebuilt tree may hit a
//! node of the wrong type (the source was edited); a [`RecoveryStrategy`] then decides where to
//! look instead.
//!
//! Search order (stable, clients rely on it):
//! - sibling search: children of the current parent whose type matches, ranked by exact span
//!   match first, then by distance to the recorded index, lower index on ties;
//! - subtree search: breadth-first below the child at the recorded index, children in order,
//!   an exact span match wins over the first type match.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{NodeId, Span, Tree};

/// One hop from a parent to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub type_name: String,
    pub child_index: u32,
    /// Source span of the node when the locator was made; used as a recovery hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Step {
    pub fn new(type_name: impl Into<String>, child_index: u32) -> Self {
        Self { type_name: type_name.into(), child_index, span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Root-to-node path. The empty locator addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Locator {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Locator {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Type name of the addressed node, if the locator has any steps.
    pub fn target_type(&self) -> Option<&str> {
        self.steps.last().map(|step| step.type_name.as_str())
    }

    /// Records the path from the root of `tree` to `node`.
    ///
    /// Returns `None` when `node` does not belong to `tree`.
    pub fn create(tree: &Tree, node: NodeId) -> Option<Self> {
        let mut steps = Vec::with_capacity(tree.depth(node));
        let mut current = tree.node(node)?;
        while let Some(parent) = current.parent() {
            let mut step = Step::new(current.type_name(), current.index_in_parent());
            step.span = current.span();
            steps.push(step);
            current = tree.node(parent)?;
        }
        steps.reverse();
        Some(Self { steps })
    }

    /// Walks the recorded steps from the root of `tree`.
    ///
    /// Whenever the child at the recorded index is missing or has a different type, `strategy`
    /// picks a replacement; [`RecoveryStrategy::Fail`] gives up immediately.
    pub fn resolve(&self, tree: &Tree, strategy: RecoveryStrategy) -> Result<NodeId, ResolveError> {
        let mut current = tree.root();
        if !tree.contains(current) {
            return Err(ResolveError::EmptyTree);
        }

        for (depth, step) in self.steps.iter().enumerate() {
            let index = step.child_index as usize;
            let direct = tree.child(current, index);
            if let Some(child) = direct {
                if tree.type_name(child) == Some(step.type_name.as_str()) {
                    current = child;
                    continue;
                }
            }

            current = match recover(tree, current, direct, step, strategy) {
                Some(found) => found,
                None => {
                    return Err(match (strategy, direct) {
                        (RecoveryStrategy::Fail, None) => ResolveError::IndexOutOfRange {
                            depth,
                            index: step.child_index,
                            len: tree.children(current).len(),
                        },
                        (RecoveryStrategy::Fail, Some(found)) => ResolveError::TypeMismatch {
                            depth,
                            expected: step.type_name.clone(),
                            found: tree.type_name(found).unwrap_or_default().to_owned(),
                        },
                        (strategy, _) => ResolveError::NotRecovered {
                            depth,
                            expected: step.type_name.clone(),
                            strategy,
                        },
                    });
                }
            };
        }

        Ok(current)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for step in &self.steps {
            write!(f, "/{}[{}]", step.type_name, step.child_index)?;
        }
        Ok(())
    }
}

/// How to re-resolve a step whose indexed child is missing or of the wrong type.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// No recovery.
    Fail,
    /// Other children of the same parent.
    Parent,
    /// Descend into the mismatched child.
    Child,
    #[default]
    ParentThenChild,
    ChildThenParent,
}

impl RecoveryStrategy {
    pub const ALL: [RecoveryStrategy; 5] = [
        Self::Fail,
        Self::Parent,
        Self::Child,
        Self::ParentThenChild,
        Self::ChildThenParent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Parent => "parent",
            Self::Child => "child",
            Self::ParentThenChild => "parent-then-child",
            Self::ChildThenParent => "child-then-parent",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryStrategy {
    type Err = ParseRecoveryStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ParseRecoveryStrategyError(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown recovery strategy `{0}` (expected fail, parent, child, parent-then-child or child-then-parent)")]
pub struct ParseRecoveryStrategyError(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("tree has no root")]
    EmptyTree,
    #[error("step {depth}: no child at index {index} (parent has {len})")]
    IndexOutOfRange { depth: usize, index: u32, len: usize },
    #[error("step {depth}: expected `{expected}`, found `{found}`")]
    TypeMismatch { depth: usize, expected: String, found: String },
    #[error("step {depth}: no `{expected}` node reachable with {strategy} recovery")]
    NotRecovered { depth: usize, expected: String, strategy: RecoveryStrategy },
}

fn recover(
    tree: &Tree,
    parent: NodeId,
    mismatched: Option<NodeId>,
    step: &Step,
    strategy: RecoveryStrategy,
) -> Option<NodeId> {
    let in_parent = || search_siblings(tree, parent, step);
    let in_child = || mismatched.and_then(|child| search_subtree(tree, child, step));
    match strategy {
        RecoveryStrategy::Fail => None,
        RecoveryStrategy::Parent => in_parent(),
        RecoveryStrategy::Child => in_child(),
        RecoveryStrategy::ParentThenChild => in_parent().or_else(in_child),
        RecoveryStrategy::ChildThenParent => in_child().or_else(in_parent),
    }
}

fn search_siblings(tree: &Tree, parent: NodeId, step: &Step) -> Option<NodeId> {
    let recorded = step.child_index as usize;
    tree.children(parent)
        .iter()
        .enumerate()
        .filter(|(_, child)| tree.type_name(**child) == Some(step.type_name.as_str()))
        .min_by_key(|(index, child)| {
            let span_miss = step.span.is_none() || tree.span(**child) != step.span;
            (span_miss, index.abs_diff(recorded), *index)
        })
        .map(|(_, child)| *child)
}

fn search_subtree(tree: &Tree, start: NodeId, step: &Step) -> Option<NodeId> {
    let mut first_match = None;
    for candidate in tree.descendants_bfs(start) {
        if tree.type_name(candidate) != Some(step.type_name.as_str()) {
            continue;
        }
        if step.span.is_none() {
            return Some(candidate);
        }
        if tree.span(candidate) == step.span {
            return Some(candidate);
        }
        first_match.get_or_insert(candidate);
    }
    first_match
}

#[cfg(test)]
mod tests;
