// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Request pipeline: decode, locate, invoke, encode.
//!
//! Every request runs inside one critical section spanning tree checkout through value encoding.
//! The section is the lock around the [`CacheController`]; its guard is released on every exit
//! path, including frontend panics.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::cache::{BuildInput, CacheController, CacheStats, CacheStrategy};
use crate::codec::{self, DecodeContext, DecodeError, EncodedValue, Encoder, ParameterValue};
use crate::frontend::{Frontend, InvocationContext, InvocationError, ParseError};
use crate::locator::{Locator, RecoveryStrategy, ResolveError};
use crate::model::{NodeId, Tree};
use crate::protocol::{ErrorKind, ProbeQuery, RequestEnvelope, RequestStats, ResponseEnvelope};

/// Server-wide defaults applied when a request leaves a policy unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub cache_strategy: CacheStrategy,
    pub recovery: RecoveryStrategy,
    pub max_compound_depth: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            cache_strategy: CacheStrategy::Full,
            recovery: RecoveryStrategy::default(),
            max_compound_depth: codec::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Where a request is in the pipeline. `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decoded,
    Located,
    Invoked,
    Encoded,
    Sent,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decoded => "decoded",
            Self::Located => "located",
            Self::Invoked => "invoked",
            Self::Encoded => "encoded",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("node not found, probe likely stale; remake the probe ({0})")]
    NodeNotFound(#[from] ResolveError),
    #[error("argument {index}: {reason}")]
    ArgumentDecode { index: usize, reason: DecodeError },
    #[error("{0}")]
    Invocation(#[from] InvocationError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::NodeNotFound(_) => ErrorKind::NodeNotFound,
            Self::ArgumentDecode { .. } => ErrorKind::ArgumentDecode,
            Self::Invocation(_) => ErrorKind::Invocation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Stages one request has reached, in order. Every transition is logged.
#[derive(Debug)]
struct StageTrace {
    request_id: u64,
    stages: Vec<Stage>,
}

impl StageTrace {
    fn new(request_id: u64) -> Self {
        Self { request_id, stages: vec![Stage::Decoded] }
    }

    fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Decoded)
    }

    fn advance(&mut self, stage: Stage) {
        self.stages.push(stage);
        tracing::debug!(request_id = self.request_id, %stage, "request advanced");
    }
}

/// Result of a request that made it through `Encoded`.
#[derive(Debug)]
struct Completed {
    body: Vec<EncodedValue>,
    messages: Vec<String>,
    stats: RequestStats,
}

pub struct Dispatcher {
    frontend: Arc<dyn Frontend>,
    cache: Mutex<CacheController>,
    options: DispatchOptions,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("frontend", &self.frontend.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(frontend: Arc<dyn Frontend>, options: DispatchOptions) -> Self {
        let cache = CacheController::new(Arc::clone(&frontend));
        Self { frontend, cache: Mutex::new(cache), options }
    }

    pub fn frontend(&self) -> &dyn Frontend {
        self.frontend.as_ref()
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    pub async fn clear_cache(&self) -> bool {
        self.cache.lock().await.clear()
    }

    /// Runs one request to completion. Never panics and never leaves the critical section held.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let id = request.id;
        let started = Instant::now();
        let mut cache = self.cache.lock().await;
        let mut trace = StageTrace::new(id);
        tracing::debug!(
            request_id = id,
            kind = request.query.kind(),
            stage = %trace.current(),
            "request accepted"
        );

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.run(&mut cache, &request, &mut trace)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                // The tree may be half-mutated; never hand it out again.
                cache.clear();
                Err(ProbeError::Internal(panic_message(payload.as_ref())))
            }
        };
        drop(cache);

        match result {
            Ok(done) => {
                tracing::info!(
                    request_id = id,
                    generation = done.stats.generation,
                    reused = done.stats.reused_tree,
                    values = done.body.len(),
                    elapsed_micros = started.elapsed().as_micros() as u64,
                    "probe served"
                );
                let mut response = ResponseEnvelope::success(id, done.body);
                response.messages = done.messages;
                response.stats = Some(done.stats);
                response
            }
            Err(err) => {
                tracing::warn!(
                    request_id = id,
                    failed_after = %trace.current(),
                    stage = %Stage::Failed,
                    kind = ?err.kind(),
                    error = %err,
                    "probe failed"
                );
                ResponseEnvelope::failure(Some(id), err.kind(), err.to_string())
            }
        }
    }

    fn run(
        &self,
        cache: &mut CacheController,
        request: &RequestEnvelope,
        trace: &mut StageTrace,
    ) -> Result<Completed, ProbeError> {
        let id = request.id;
        let strategy = request.source.cache.unwrap_or(self.options.cache_strategy);
        let recovery = request.recovery.unwrap_or(self.options.recovery);
        let input: BuildInput = request.source.build_input();

        let checkout = cache.get_or_build(&input, strategy)?;
        let tree = checkout.tree;
        let mut stats = RequestStats {
            generation: tree.generation(),
            reused_tree: checkout.reused,
            parse_micros: micros(checkout.parse_time),
            invoke_micros: 0,
            resets: checkout.resets as u64,
        };
        let mut messages = Vec::new();

        let body = match &request.query {
            ProbeQuery::Evaluate { locator, property, args } => {
                let node = self.locate(tree, locator, recovery, trace)?;
                let params = decode_args(tree, args, recovery)?;

                let mut cx = InvocationContext::default();
                let started = Instant::now();
                let value = self.frontend.invoke(tree, node, property, &params, &mut cx)?;
                stats.invoke_micros = micros(started.elapsed());
                messages = cx.into_messages();
                trace.advance(Stage::Invoked);

                let body = self.encoder(tree).encode(&value);
                // Nothing reads the value after encoding; cyclic lists would otherwise leak.
                value.break_cycles();
                body
            }
            ProbeQuery::ListProperties { locator } => {
                let node = self.locate(tree, locator, recovery, trace)?;
                let properties = self.frontend.properties(tree, node);
                trace.advance(Stage::Invoked);
                properties.iter().map(|info| EncodedValue::plain(info.to_string())).collect()
            }
            ProbeQuery::ListNodes { offset } => {
                let nodes = nodes_at(tree, *offset);
                trace.advance(Stage::Located);
                trace.advance(Stage::Invoked);
                let encoder = self.encoder(tree);
                nodes.into_iter().map(|node| encoder.node_ref(node)).collect()
            }
            ProbeQuery::ListTree { locator } => {
                let node = self.locate(tree, locator, recovery, trace)?;
                trace.advance(Stage::Invoked);
                vec![self.encoder(tree).subtree(node)]
            }
        };

        trace.advance(Stage::Encoded);
        tracing::debug!(request_id = id, values = body.len(), "result encoded");
        Ok(Completed { body, messages, stats })
    }

    fn locate(
        &self,
        tree: &Tree,
        locator: &Locator,
        recovery: RecoveryStrategy,
        trace: &mut StageTrace,
    ) -> Result<NodeId, ProbeError> {
        let node = locator.resolve(tree, recovery)?;
        tracing::debug!(
            request_id = trace.request_id,
            locator = %locator,
            %recovery,
            node = %tree.label(node),
            "target located"
        );
        trace.advance(Stage::Located);
        Ok(node)
    }

    fn encoder<'t>(&self, tree: &'t Tree) -> Encoder<'t> {
        Encoder::new(tree).with_max_depth(self.options.max_compound_depth)
    }
}

/// Decodes arguments in order, binding node arguments against `tree`.
fn decode_args(
    tree: &Tree,
    args: &[codec::Argument],
    recovery: RecoveryStrategy,
) -> Result<Vec<ParameterValue>, ProbeError> {
    let cx = DecodeContext { tree, recovery };
    args.iter()
        .enumerate()
        .map(|(index, argument)| {
            codec::decode(argument, &cx).map_err(|reason| ProbeError::ArgumentDecode { index, reason })
        })
        .collect()
}

/// Nodes whose span contains `offset`, deepest first; ties keep tree order.
fn nodes_at(tree: &Tree, offset: u32) -> Vec<NodeId> {
    let mut hits: Vec<(usize, NodeId)> = tree
        .node_ids()
        .filter(|id| tree.span(*id).is_some_and(|span| span.contains(offset)))
        .map(|id| (tree.depth(id), id))
        .collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, id)| id).collect()
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("frontend panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("frontend panicked: {message}")
    } else {
        "frontend panicked".to_owned()
    }
}
