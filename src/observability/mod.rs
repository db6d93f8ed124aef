// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structured logging for the client, the engine and the server binary.
//!
//! Every operational event is a small message struct with a `Display`
//! implementation and a [`messages::StructuredLog`] implementation that emits
//! it through `tracing` with typed fields. Keeping the wording in one place
//! means call sites never carry format strings of their own.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::server` - server handles, sessions, transports and launchers
//! * `messages::operator` - operator creation and evaluation
//! * `messages::workflow` - workflow composition and chunked evaluation
//! * `messages::plugin` - plug-in loading (WebAssembly and native)
//!
//! # Usage
//!
//! ```rust
//! use dpf_client::observability::messages::operator::OperatorCreated;
//! use dpf_client::observability::messages::StructuredLog;
//!
//! OperatorCreated {
//!     operator: "min_max",
//!     object: 12,
//! }
//! .log();
//! ```

pub mod messages;
