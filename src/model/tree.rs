// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

use super::value::HostValue;

/// Index of a node inside one [`Tree`] instance.
///
/// Ids are only meaningful for the tree that produced them; after a rebuild, clients must go
/// through a `Locator` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Half-open byte range `[start, end)` into the source text.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    JsonSchema,
)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive on both ends so a caret placed right after a token still hits it.
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Memoized computed-property values of one node.
///
/// Frontends decide what goes in here; the cache controller only cares whether the table has
/// been populated since the last reset.
#[derive(Debug, Clone, Default)]
pub struct MemoTable {
    entries: BTreeMap<String, HostValue>,
}

impl MemoTable {
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: HostValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    type_name: SmolStr,
    parent: Option<NodeId>,
    index_in_parent: u32,
    children: SmallVec<[NodeId; 4]>,
    span: Option<Span>,
    text: Option<SmolStr>,
    memo: Option<MemoTable>,
}

impl Node {
    fn new(type_name: SmolStr, parent: Option<NodeId>, index_in_parent: u32) -> Self {
        Self {
            type_name,
            parent,
            index_in_parent,
            children: SmallVec::new(),
            span: None,
            text: None,
            memo: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn index_in_parent(&self) -> u32 {
        self.index_in_parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// Token text for leaves (identifiers, literals).
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// `None` means the node type exposes no memoized state and therefore no reset.
    pub fn memo(&self) -> Option<&MemoTable> {
        self.memo.as_ref()
    }

    pub fn memo_mut(&mut self) -> Option<&mut MemoTable> {
        self.memo.as_mut()
    }
}

/// Rooted, ordered tree produced by a frontend.
///
/// Shape is fixed once built; only memo tables change afterwards.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    source: String,
    build_args: Vec<String>,
    generation: u64,
}

impl Tree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn type_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::type_name)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.node(id).and_then(Node::span)
    }

    pub fn memo_mut(&mut self, id: NodeId) -> Option<&mut MemoTable> {
        self.node_mut(id).and_then(Node::memo_mut)
    }

    pub fn depth(&self, id: NodeId) -> usize {
        std::iter::successors(self.parent(id), |p| self.parent(*p)).count()
    }

    /// True when `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        std::iter::successors(self.parent(node), |p| self.parent(*p)).any(|p| p == ancestor)
    }

    /// Breadth-first walk below `start` (excluding `start`), children in order.
    pub fn descendants_bfs(&self, start: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut queue: VecDeque<NodeId> = self.children(start).iter().copied().collect();
        std::iter::from_fn(move || {
            let next = queue.pop_front()?;
            queue.extend(self.children(next).iter().copied());
            Some(next)
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source slice covered by `id`, if it has a span inside the source.
    pub fn source_text(&self, id: NodeId) -> Option<&str> {
        let span = self.span(id)?;
        self.source.get(span.start as usize..span.end as usize)
    }

    pub fn build_args(&self) -> &[String] {
        &self.build_args
    }

    /// Monotonic build number assigned by the cache; `0` until the tree is handed to one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Human-readable label for node references: type name, plus token text for leaves.
    pub fn label(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(node) => match node.text() {
                Some(text) => format!("{} {text:?}", node.type_name()),
                None => node.type_name().to_owned(),
            },
            None => format!("<unknown node {id}>"),
        }
    }
}

/// Incremental constructor used by frontends.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    source: String,
    build_args: Vec<String>,
}

impl TreeBuilder {
    pub fn new(root_type: impl Into<SmolStr>) -> Self {
        Self {
            nodes: vec![Node::new(root_type.into(), None, 0)],
            source: String::new(),
            build_args: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn build_args(mut self, args: Vec<String>) -> Self {
        self.build_args = args;
        self
    }

    /// Appends a child to `parent`. Ids handed out by this builder are always valid parents.
    pub fn add_child(&mut self, parent: NodeId, type_name: impl Into<SmolStr>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let siblings = &mut self.nodes[parent.index()].children;
        let index_in_parent = siblings.len() as u32;
        siblings.push(id);
        self.nodes.push(Node::new(type_name.into(), Some(parent), index_in_parent));
        id
    }

    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id.index()].span = Some(span);
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<SmolStr>) {
        self.nodes[id.index()].text = Some(text.into());
    }

    /// Gives the node an (empty) memo table, i.e. makes it resettable.
    pub fn enable_memo(&mut self, id: NodeId) {
        self.nodes[id.index()].memo = Some(MemoTable::default());
    }

    pub fn finish(self) -> Tree {
        Tree { nodes: self.nodes, source: self.source, build_args: self.build_args, generation: 0 }
    }
}
