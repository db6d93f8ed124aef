// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for server handles, sessions and transports.
//!
//! This module contains message types for logging events related to:
//! * Starting, connecting to and shutting down backends
//! * Session lifecycle on the engine side
//! * Individual backend calls and their deadlines
//! * The gRPC service and backend processes

use crate::errors::DpfError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A server handle is ready for calls.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dpf_client::observability::messages::server::ServerStarted;
///
/// let msg = ServerStarted {
///     transport: "grpc-current",
///     endpoint: "127.0.0.1:50052",
///     version: "9.0",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ServerStarted<'a> {
    pub transport: &'a str,
    pub endpoint: &'a str,
    pub version: &'a str,
}

impl Display for ServerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Connected to {} server at {} (version {})",
            self.transport, self.endpoint, self.version
        )
    }
}

impl StructuredLog for ServerStarted<'_> {
    fn log(&self) {
        tracing::info!(
            transport = self.transport,
            endpoint = self.endpoint,
            version = self.version,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "server",
            span_name = name,
            transport = self.transport,
            endpoint = self.endpoint,
        )
    }
}

/// A server handle was shut down.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServerShutdown<'a> {
    pub endpoint: &'a str,
    pub live_objects: usize,
}

impl Display for ServerShutdown<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shut down server at {} ({} objects still referenced)",
            self.endpoint, self.live_objects
        )
    }
}

impl StructuredLog for ServerShutdown<'_> {
    fn log(&self) {
        tracing::info!(
            endpoint = self.endpoint,
            live_objects = self.live_objects,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("server_shutdown", span_name = name, endpoint = self.endpoint)
    }
}

/// The engine opened a session for a client.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use dpf_client::observability::messages::server::SessionOpened;
///
/// let msg = SessionOpened {
///     session: 3,
///     client: "dpf-client 0.1.0",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct SessionOpened<'a> {
    pub session: u64,
    pub client: &'a str,
}

impl Display for SessionOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Opened session {} for '{}'", self.session, self.client)
    }
}

impl StructuredLog for SessionOpened<'_> {
    fn log(&self) {
        tracing::info!(session = self.session, client = self.client, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("session", span_name = name, session = self.session)
    }
}

/// The engine closed a session and dropped everything it owned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SessionClosed {
    pub session: u64,
    pub dropped_objects: usize,
}

impl Display for SessionClosed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Closed session {} ({} objects dropped)",
            self.session, self.dropped_objects
        )
    }
}

impl StructuredLog for SessionClosed {
    fn log(&self) {
        tracing::info!(
            session = self.session,
            dropped_objects = self.dropped_objects,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("session_closed", span_name = name, session = self.session)
    }
}

/// The engine answered one request. The display form is also the line
/// written to a session log file.
///
/// # Log Level
/// `debug!` - Per-call diagnostics
pub struct RequestHandled<'a> {
    pub session: u64,
    pub request: &'a str,
    pub error: Option<&'a dyn std::error::Error>,
    pub duration: Duration,
}

impl Display for RequestHandled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.error {
            None => write!(
                f,
                "session {}: {} ok in {:?}",
                self.session, self.request, self.duration
            ),
            Some(error) => write!(
                f,
                "session {}: {} failed in {:?}: {}",
                self.session, self.request, self.duration, error
            ),
        }
    }
}

impl StructuredLog for RequestHandled<'_> {
    fn log(&self) {
        match self.error {
            None => tracing::debug!(
                session = self.session,
                request = self.request,
                duration_us = self.duration.as_micros() as u64,
                "{}", self
            ),
            Some(error) => tracing::debug!(
                session = self.session,
                request = self.request,
                error = %error,
                "{}", self
            ),
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "request",
            span_name = name,
            session = self.session,
            request = self.request,
        )
    }
}

/// A backend call missed its deadline.
///
/// # Log Level
/// `warn!` - The backend may still be computing
pub struct CallTimedOut<'a> {
    pub request: &'a str,
    pub deadline: Duration,
}

impl Display for CallTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Backend call {} exceeded its {:?} deadline",
            self.request, self.deadline
        )
    }
}

impl StructuredLog for CallTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            request = self.request,
            deadline_ms = self.deadline.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("call_timeout", span_name = name, request = self.request)
    }
}

/// Releases queued by dropped handles were sent to the backend.
///
/// # Log Level
/// `debug!` - Routine bookkeeping
pub struct ReleasesFlushed {
    pub count: usize,
}

impl Display for ReleasesFlushed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Released {} dropped objects", self.count)
    }
}

impl StructuredLog for ReleasesFlushed {
    fn log(&self) {
        tracing::debug!(count = self.count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("release", span_name = name, count = self.count)
    }
}

/// A backend process or container was spawned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BackendLaunched<'a> {
    pub program: &'a str,
    pub endpoint: &'a str,
}

impl Display for BackendLaunched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Launched '{}' serving on {}", self.program, self.endpoint)
    }
}

impl StructuredLog for BackendLaunched<'_> {
    fn log(&self) {
        tracing::info!(program = self.program, endpoint = self.endpoint, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("launch", span_name = name, program = self.program)
    }
}

/// A backend this client launched could not be stopped.
///
/// # Log Level
/// `warn!` - The process or container may outlive the client
pub struct BackendStopFailed<'a> {
    pub backend: &'a str,
    pub error: &'a DpfError,
}

impl Display for BackendStopFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Cannot stop backend {}: {}", self.backend, self.error)
    }
}

impl StructuredLog for BackendStopFailed<'_> {
    fn log(&self) {
        tracing::warn!(backend = self.backend, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("backend_stop", span_name = name, backend = self.backend)
    }
}

/// The gRPC service accepts connections.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServiceListening<'a> {
    pub address: &'a str,
    pub version: &'a str,
}

impl Display for ServiceListening<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Serving engine version {} on {}",
            self.version, self.address
        )
    }
}

impl StructuredLog for ServiceListening<'_> {
    fn log(&self) {
        tracing::info!(address = self.address, version = self.version, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("service", span_name = name, address = self.address)
    }
}

/// The gRPC service stopped.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServiceStopped<'a> {
    pub address: &'a str,
}

impl Display for ServiceStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stopped serving on {}", self.address)
    }
}

impl StructuredLog for ServiceStopped<'_> {
    fn log(&self) {
        tracing::info!(address = self.address, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("service_stopped", span_name = name, address = self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_handled_formats_both_outcomes() {
        let ok = RequestHandled {
            session: 2,
            request: "operator.output",
            error: None,
            duration: Duration::from_millis(3),
        };
        assert_eq!(ok.to_string(), "session 2: operator.output ok in 3ms");

        let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let failed = RequestHandled {
            session: 2,
            request: "file.upload",
            error: Some(&error),
            duration: Duration::from_millis(1),
        };
        assert!(failed.to_string().ends_with("failed in 1ms: boom"));
    }

    #[test]
    fn test_server_started_display() {
        let msg = ServerStarted {
            transport: "in-process",
            endpoint: "in-process",
            version: "9.0",
        };
        assert_eq!(
            msg.to_string(),
            "Connected to in-process server at in-process (version 9.0)"
        );
    }
}
