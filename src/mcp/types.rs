// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStrategy;
use crate::codec::Argument;
use crate::locator::{Locator, RecoveryStrategy};

/// Flattened form of an `evaluate` request for agents that do not want to build envelopes.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProbeEvaluateParams {
    pub source: String,
    /// Build arguments passed to the frontend's parser, e.g. `x=4` for `calc`.
    #[serde(default)]
    pub build_args: Vec<String>,
    /// Target node; omit for the root.
    #[serde(default)]
    pub locator: Locator,
    pub property: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    pub cache: Option<CacheStrategy>,
    pub recovery: Option<RecoveryStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearResponse {
    /// Whether a cached tree was dropped.
    pub cleared: bool,
}
