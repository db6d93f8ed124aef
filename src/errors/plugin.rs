// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for plug-in loading and execution.
//!
//! Covers both plug-in flavours: sandboxed WebAssembly core modules and native
//! dynamic libraries. At the engine boundary these become `DpfError`s of kind
//! `io` (load failures) or `evaluation-failed` (runtime traps).

use thiserror::Error;

/// Error message for component-model binaries, which plug-ins cannot be.
pub const WASM_UNSUPPORTED_ENCODING: &str =
    "Unsupported WASM binary: Component Model detected. Operator plug-ins must be core WASM modules.";

#[derive(Error, Debug)]
pub enum PluginError {
    /// Invalid or malformed WASM binary format.
    #[error("Invalid WASM binary: {0}")]
    InvalidWasmBinary(String),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Module compilation or instantiation error.
    #[error("WASM module error: {0}")]
    ModuleError(String),

    #[error("plug-in does not export '{0}'")]
    MissingExport(String),

    /// The initializer returned something other than `operator=export` lines.
    #[error("invalid plug-in manifest: {0}")]
    Manifest(String),

    #[error("Memory error: {0}")]
    MemoryError(String),

    /// Wasmtime runtime execution error.
    #[error("WASM execution error: {0}")]
    ExecutionError(#[from] wasmtime::Error),

    /// WASM binary parsing error from wasmparser.
    #[error("WASM parser error: {0}")]
    ParserError(#[from] wasmparser::BinaryReaderError),

    #[error("cannot load native library: {0}")]
    Library(#[from] libloading::Error),

    #[error("plug-in initializer '{0}' returned null")]
    NullPlugin(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("operator '{0}' is already registered")]
    DuplicateOperator(String),
}

/// Result type alias for plug-in operations.
pub type PluginResult<T> = Result<T, PluginError>;
