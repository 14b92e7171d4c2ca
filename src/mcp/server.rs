// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};

use crate::cache::CacheStats;
use crate::dispatch::Dispatcher;
use crate::protocol::{ProbeQuery, RequestEnvelope, ResponseEnvelope, SourceSpec};

use super::types::*;

#[derive(Clone)]
pub struct TritonMcp {
    dispatcher: Arc<Dispatcher>,
    next_id: Arc<AtomicU64>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TritonMcp {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher, next_id: Arc::new(AtomicU64::new(1)), tool_router: Self::tool_router() }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    /// Run a full probe envelope (`evaluate`, `list_properties`, `list_nodes` or `list_tree`);
    /// failures come back as an `error` body, not as a tool error.
    #[tool(name = "probe.request")]
    async fn probe_request(
        &self,
        params: Parameters<RequestEnvelope>,
    ) -> Result<Json<ResponseEnvelope>, ErrorData> {
        Ok(Json(self.dispatcher.dispatch(params.0).await))
    }

    /// Evaluate one property on the node at `locator` (root if omitted); node results carry
    /// fresh locators for follow-up probes.
    #[tool(name = "probe.evaluate")]
    async fn probe_evaluate(
        &self,
        params: Parameters<ProbeEvaluateParams>,
    ) -> Result<Json<ResponseEnvelope>, ErrorData> {
        let ProbeEvaluateParams { source, build_args, locator, property, args, cache, recovery } =
            params.0;
        if property.trim().is_empty() {
            return Err(ErrorData::invalid_params("property name must not be empty", None));
        }

        let request = RequestEnvelope {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            source: SourceSpec { text: source, args: build_args, cache },
            recovery,
            query: ProbeQuery::Evaluate { locator, property, args },
        };
        Ok(Json(self.dispatcher.dispatch(request).await))
    }

    /// Read cache counters and the generation of the cached tree.
    #[tool(name = "cache.stat")]
    async fn cache_stat(&self) -> Result<Json<CacheStats>, ErrorData> {
        Ok(Json(self.dispatcher.cache_stats().await))
    }

    /// Drop the cached tree; the next probe parses afresh.
    #[tool(name = "cache.clear")]
    async fn cache_clear(&self) -> Result<Json<CacheClearResponse>, ErrorData> {
        let cleared = self.dispatcher.clear_cache().await;
        Ok(Json(CacheClearResponse { cleared }))
    }
}

#[tool_handler]
impl ServerHandler for TritonMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "Triton AST probe server, frontend `{}` (tools: probe.request, probe.evaluate, cache.stat, cache.clear)",
                self.dispatcher.frontend().name()
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
