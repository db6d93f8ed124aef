// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! # Organization
//!
//! * `server` - server handle, session and transport events
//! * `operator` - operator lifecycle and evaluation events
//! * `workflow` - workflow composition and chunking events
//! * `plugin` - plug-in loading events
//!
//! # Usage Pattern
//!
//! ```rust
//! use dpf_client::observability::messages::server::SessionOpened;
//!
//! let msg = SessionOpened {
//!     session: 1,
//!     client: "post-processing script",
//! };
//!
//! tracing::info!("{}", msg);
//! ```

use tracing::Span;

pub mod operator;
pub mod plugin;
pub mod server;
pub mod workflow;

/// A message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a single event.
    fn log(&self);

    /// Open a span carrying the message fields.
    fn span(&self, name: &str) -> Span;
}
