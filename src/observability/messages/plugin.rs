// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for plug-in loading and WebAssembly execution.
//!
//! This module contains message types for logging events related to:
//! * WebAssembly module loading and validation
//! * Native library loading
//! * Operator registration under a plug-in alias

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// WASM module read and size-checked.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
///
/// # Example
/// ```
/// use dpf_client::observability::messages::plugin::ModuleLoaded;
///
/// let msg = ModuleLoaded {
///     module_path: "plugins/scale.wasm",
///     size_bytes: 4096,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ModuleLoaded<'a> {
    pub module_path: &'a str,
    pub size_bytes: usize,
}

impl Display for ModuleLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded WASM module: {} ({} bytes)",
            self.module_path, self.size_bytes
        )
    }
}

/// WASM module could not be read.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ModuleLoadFailed<'a> {
    pub module_path: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ModuleLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to load WASM module '{}': {}",
            self.module_path, self.error
        )
    }
}

impl StructuredLog for ModuleLoaded<'_> {
    fn log(&self) {
        tracing::debug!(
            module_path = self.module_path,
            size_bytes = self.size_bytes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("module", span_name = name, module_path = self.module_path)
    }
}

impl StructuredLog for ModuleLoadFailed<'_> {
    fn log(&self) {
        tracing::error!(module_path = self.module_path, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("module_failed", span_name = name, module_path = self.module_path)
    }
}

/// A plug-in registered its operators.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dpf_client::observability::messages::plugin::PluginLoaded;
///
/// let msg = PluginLoaded {
///     path: "plugins/libmechanical.so",
///     alias: "mech",
///     kind: "native",
///     operator_count: 12,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct PluginLoaded<'a> {
    pub path: &'a str,
    pub alias: &'a str,
    pub kind: &'a str,
    pub operator_count: usize,
}

impl Display for PluginLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} plug-in '{}' as '{}': {} operators",
            self.kind, self.path, self.alias, self.operator_count
        )
    }
}

impl StructuredLog for PluginLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            path = self.path,
            alias = self.alias,
            kind = self.kind,
            operator_count = self.operator_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "plugin",
            span_name = name,
            path = self.path,
            alias = self.alias,
        )
    }
}

/// A plug-in failed to load; nothing was registered.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct PluginLoadFailed<'a> {
    pub path: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PluginLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Failed to load plug-in '{}': {}", self.path, self.error)
    }
}

impl StructuredLog for PluginLoadFailed<'_> {
    fn log(&self) {
        tracing::error!(path = self.path, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("plugin_failed", span_name = name, path = self.path)
    }
}

/// WASM export trapped or ran out of fuel.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ExecutionFailed<'a> {
    pub export: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ExecutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "WASM export '{}' failed: {}", self.export, self.error)
    }
}
