// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Reading plug-in files from the backend host.
//!
//! The registry sniffs a file's first bytes to pick a loader; only WASM
//! modules are read whole, native libraries are handed to `libloading`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::detector::{is_wasm, WASM_MAGIC};
use crate::errors::{PluginError, PluginResult};
use crate::observability::messages::plugin::{ModuleLoadFailed, ModuleLoaded};
use crate::observability::messages::StructuredLog;

/// Largest module accepted as a plug-in (16 MiB).
pub const MAX_MODULE_BYTES: u64 = 16 * 1024 * 1024;

/// Whether `path` starts with the WASM magic number.
pub fn is_wasm_file(path: &Path) -> PluginResult<bool> {
    let mut magic = [0u8; WASM_MAGIC.len()];
    let read = File::open(path)?.read(&mut magic)?;
    Ok(is_wasm(&magic[..read]))
}

/// Read a whole module, refusing files above [`MAX_MODULE_BYTES`] before
/// their content is touched.
pub fn read_module(path: &Path) -> PluginResult<Vec<u8>> {
    let module_path = path.display().to_string();
    let fail = |error: PluginError| {
        ModuleLoadFailed {
            module_path: &module_path,
            error: &error,
        }
        .log();
        error
    };

    let size = std::fs::metadata(path).map_err(|e| fail(e.into()))?.len();
    if size > MAX_MODULE_BYTES {
        return Err(fail(PluginError::InvalidWasmBinary(format!(
            "module is {size} bytes, the limit is {MAX_MODULE_BYTES}"
        ))));
    }
    let bytes = std::fs::read(path).map_err(|e| fail(e.into()))?;

    ModuleLoaded {
        module_path: &module_path,
        size_bytes: bytes.len(),
    }
    .log();
    Ok(bytes)
}
