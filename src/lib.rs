// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Triton: interactive probe server for computed properties on live syntax trees.
//!
//! A client sends source text, a [`locator::Locator`] naming a node and a property name; the
//! server parses (or reuses) the tree through a [`frontend::Frontend`], evaluates the property
//! and answers with [`codec::EncodedValue`]s. Requests are served one at a time through a single
//! critical section in [`dispatch::Dispatcher`], over JSON lines ([`transport`]) or MCP ([`mcp`]).

pub mod cache;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod frontend;
pub mod locator;
pub mod mcp;
pub mod model;
pub mod protocol;
pub mod transport;
