// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Single-entry tree cache with memo invalidation.
//!
//! The controller owns the only long-lived [`Tree`]. Callers borrow it for one request through a
//! [`Checkout`] while holding the dispatcher's critical section.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::frontend::{Frontend, ParseError};
use crate::model::{NodeId, Tree};

/// Tree reuse policy for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStrategy {
    /// Reuse the cached tree when source and build arguments are unchanged.
    #[default]
    #[serde(alias = "full")]
    Full,
    /// Always parse afresh.
    #[serde(alias = "none")]
    None,
}

impl CacheStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache strategy `{0}` (expected FULL or NONE)")]
pub struct ParseCacheStrategyError(String);

impl FromStr for CacheStrategy {
    type Err = ParseCacheStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(Self::Full),
            "NONE" => Ok(Self::None),
            _ => Err(ParseCacheStrategyError(s.to_owned())),
        }
    }
}

/// Cache key: the exact inputs a tree was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BuildInput {
    pub source: String,
    pub args: Vec<String>,
}

impl BuildInput {
    pub fn new(source: impl Into<String>, args: Vec<String>) -> Self {
        Self { source: source.into(), args }
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    input: BuildInput,
    tree: Tree,
    built_at: Instant,
}

impl CacheEntry {
    pub fn input(&self) -> &BuildInput {
        &self.input
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn generation(&self) -> u64 {
        self.tree.generation()
    }

    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }
}

/// Counters reported by `cache.stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CacheStats {
    pub builds: u64,
    pub hits: u64,
    pub parse_failures: u64,
    pub resets: u64,
    /// Generation of the cached tree, if any.
    pub generation: Option<u64>,
    pub cached_nodes: Option<usize>,
}

/// A tree lent out for exactly one request.
#[derive(Debug)]
pub struct Checkout<'c> {
    pub tree: &'c mut Tree,
    pub reused: bool,
    pub parse_time: Duration,
    /// Memo tables reset before the tree was handed out.
    pub resets: usize,
}

pub struct CacheController {
    frontend: Arc<dyn Frontend>,
    entry: Option<CacheEntry>,
    next_generation: u64,
    stats: CacheStats,
}

impl fmt::Debug for CacheController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheController")
            .field("frontend", &self.frontend.name())
            .field("entry", &self.entry)
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl CacheController {
    pub fn new(frontend: Arc<dyn Frontend>) -> Self {
        Self { frontend, entry: None, next_generation: 1, stats: CacheStats::default() }
    }

    pub fn entry(&self) -> Option<&CacheEntry> {
        self.entry.as_ref()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generation: self.entry.as_ref().map(CacheEntry::generation),
            cached_nodes: self.entry.as_ref().map(|entry| entry.tree.len()),
            ..self.stats.clone()
        }
    }

    /// Drops the cached tree. Returns whether there was one.
    pub fn clear(&mut self) -> bool {
        let had_entry = self.entry.take().is_some();
        if had_entry {
            tracing::debug!("cache cleared");
        }
        had_entry
    }

    /// Returns a tree for `input`, parsing only when the cached one cannot be reused.
    ///
    /// A reused tree has every populated memo table reset first, so no property value computed
    /// by an earlier request is observable. A parse failure leaves the current entry in place.
    pub fn get_or_build(
        &mut self,
        input: &BuildInput,
        strategy: CacheStrategy,
    ) -> Result<Checkout<'_>, ParseError> {
        let reused = strategy == CacheStrategy::Full
            && self.entry.as_ref().is_some_and(|entry| entry.input == *input);
        let mut parse_time = Duration::ZERO;
        let mut resets = 0;

        if reused {
            if let Some(entry) = self.entry.as_mut() {
                resets = reset_memos(self.frontend.as_ref(), &mut entry.tree);
                self.stats.hits += 1;
                self.stats.resets += resets as u64;
                tracing::debug!(generation = entry.tree.generation(), resets, "cache hit");
            }
        } else {
            let started = Instant::now();
            let mut tree = match self.frontend.parse(&input.source, &input.args) {
                Ok(tree) => tree,
                Err(err) => {
                    self.stats.parse_failures += 1;
                    tracing::debug!(error = %err, "parse failed; cache entry kept");
                    return Err(err);
                }
            };
            parse_time = started.elapsed();

            let generation = self.next_generation;
            self.next_generation += 1;
            tree.set_generation(generation);
            self.stats.builds += 1;
            tracing::debug!(
                generation,
                %strategy,
                nodes = tree.len(),
                parse_micros = parse_time.as_micros() as u64,
                "tree built"
            );
            self.entry =
                Some(CacheEntry { input: input.clone(), tree, built_at: Instant::now() });
        }

        match self.entry.as_mut() {
            Some(entry) => Ok(Checkout { tree: &mut entry.tree, reused, parse_time, resets }),
            None => Err(ParseError::new("no tree available after build")),
        }
    }
}

/// Resets nodes whose memo table has been populated; nodes without a table are left alone.
fn reset_memos(frontend: &dyn Frontend, tree: &mut Tree) -> usize {
    let dirty: Vec<NodeId> = tree
        .node_ids()
        .filter(|id| tree.node(*id).and_then(|node| node.memo()).is_some_and(|memo| !memo.is_empty()))
        .collect();
    for node in &dirty {
        frontend.reset(tree, *node);
    }
    dirty.len()
}
