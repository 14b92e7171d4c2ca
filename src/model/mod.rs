// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Tree and value model shared by frontends and the probe core.
//!
//! Frontends build a [`Tree`] with [`TreeBuilder`] and answer property evaluations with
//! [`HostValue`]s.

pub mod tree;
pub mod value;

pub use tree::{MemoTable, Node, NodeId, Span, Tree, TreeBuilder};
pub use value::{HostList, HostValue};
