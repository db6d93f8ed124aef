// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operator implementations executed by the engine.
//!
//! # Available Backends
//!
//! ## Local Backend
//! Built-in operators compiled into the crate: field arithmetic, min/max and
//! accumulation with their incremental flavours, scoping algebra, and the
//! `chunk_in_for_each_range`/`for_each` pair behind chunked evaluation.
//!
//! ## WASM Backend
//! Sandboxed WebAssembly core modules. Every export call gets a fresh store
//! and a fuel budget; Component Model binaries are refused.
//!
//! ## Native Backend
//! Dynamic libraries whose initializer returns a [`native::NativePlugin`].
//! No sandbox; the library stays loaded while its operators are alive.
//!
//! ## Stub Backend (Test-Only)
//! - **FailingOperator**: always fails evaluation
//! - **CountingOperator**: forwards pin 0 and counts runs
//! - **NoOutputOperator**: declares an output it never produces
//!
//! # Examples
//!
//! ```rust
//! use dpf_client::backends::local::LocalOperatorFactory;
//! use dpf_client::protocol::Version;
//!
//! let op = LocalOperatorFactory::create_operator("min_max", Version::new(9, 0))
//!     .expect("built-in operator");
//! assert_eq!(op.specification().outputs.len(), 2);
//! ```

pub mod local;
pub mod native;
#[cfg(test)]
pub mod stub;
pub mod wasm;
