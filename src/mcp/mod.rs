// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Model Context Protocol (MCP) server surface.
//!
//! Exposes the probe dispatcher as MCP tools so agents can probe trees over stdio or
//! streamable HTTP, next to the plain JSON-lines transport.

mod server;
mod types;

pub use server::TritonMcp;
pub use types::{CacheClearResponse, ProbeEvaluateParams};
