// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while loading or validating a server configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Extension other than .yaml, .yml or .toml.
    #[error("unsupported config format '{0}' (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
