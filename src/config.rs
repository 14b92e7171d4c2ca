// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Server configuration, read from an optional TOML file.

use std::path::Path;

use serde::Deserialize;

use crate::cache::CacheStrategy;
use crate::codec::DEFAULT_MAX_DEPTH;
use crate::dispatch::DispatchOptions;
use crate::frontend;
use crate::locator::RecoveryStrategy;

pub const DEFAULT_HTTP_PORT: u16 = 27436;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("unknown frontend '{0}'")]
    UnknownFrontend(String),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub default_cache_strategy: CacheStrategy,
    pub default_recovery: RecoveryStrategy,
    /// `0` binds an ephemeral port.
    pub http_port: u16,
    pub max_compound_depth: usize,
    pub frontend: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_cache_strategy: CacheStrategy::Full,
            default_recovery: RecoveryStrategy::default(),
            http_port: DEFAULT_HTTP_PORT,
            max_compound_depth: DEFAULT_MAX_DEPTH,
            frontend: "calc".to_owned(),
        }
    }
}

impl ServerConfig {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            cache_strategy: self.default_cache_strategy,
            recovery: self.default_recovery,
            max_compound_depth: self.max_compound_depth,
        }
    }
}

pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig =
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.max_compound_depth == 0 {
        return Err(ConfigError::Validation("max_compound_depth must be at least 1".to_owned()));
    }
    if frontend::builtin(&config.frontend).is_none() {
        return Err(ConfigError::UnknownFrontend(config.frontend.clone()));
    }
    Ok(())
}
