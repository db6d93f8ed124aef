// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod dpf;
mod plugin;

pub use config::ConfigError;
pub use dpf::{DpfError, ErrorKind, Result};
pub use plugin::{PluginError, PluginResult, WASM_UNSUPPORTED_ENCODING};
