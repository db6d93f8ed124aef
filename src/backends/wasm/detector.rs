// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WASM binary encoding detection
//!
//! Plug-ins must be classic core modules. Component Model binaries, and
//! core modules carrying a legacy `component` custom section, are refused
//! before anything is compiled.

use crate::errors::{PluginError, PluginResult, WASM_UNSUPPORTED_ENCODING};

use wasmparser::{Encoding, Parser, Payload};

/// Magic number at the start of every WASM binary.
pub const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// Cheap sniff used to route a plug-in file to the WASM or native loader.
pub fn is_wasm(bytes: &[u8]) -> bool {
    bytes.starts_with(WASM_MAGIC)
}

/// Parse the whole binary and check that it is a core module.
///
/// # Errors
/// Returns an error if:
/// - The input is empty, truncated, or otherwise invalid per the WASM spec
/// - The binary is a component, or a core module marked as a legacy component
pub fn validate_core_module(bytes: &[u8]) -> PluginResult<()> {
    let parser = Parser::new(0);
    let mut encoding = None;
    let mut has_component_section = false;

    for payload in parser.parse_all(bytes) {
        let payload = payload?;
        match payload {
            Payload::Version { encoding: enc, .. } => {
                encoding = Some(enc);
            }
            Payload::CustomSection(reader) if reader.name() == "component" => {
                has_component_section = true;
            }
            _ => {}
        }
    }

    let encoding =
        encoding.ok_or_else(|| PluginError::InvalidWasmBinary("Invalid WASM binary".to_string()))?;

    match encoding {
        Encoding::Component => Err(PluginError::UnsupportedEncoding(
            WASM_UNSUPPORTED_ENCODING.to_string(),
        )),
        Encoding::Module if has_component_section => Err(PluginError::UnsupportedEncoding(
            WASM_UNSUPPORTED_ENCODING.to_string(),
        )),
        Encoding::Module => Ok(()),
    }
}
