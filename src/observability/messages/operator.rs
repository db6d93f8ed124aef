// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for operator lifecycle and evaluation events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// An operator was instantiated in a session.
///
/// # Log Level
/// `debug!` - Graph construction detail
///
/// # Example
/// ```
/// use dpf_client::observability::messages::operator::OperatorCreated;
///
/// let msg = OperatorCreated {
///     operator: "add",
///     object: 4,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct OperatorCreated<'a> {
    pub operator: &'a str,
    pub object: u64,
}

impl Display for OperatorCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Created operator '{}' as #{}", self.operator, self.object)
    }
}

impl StructuredLog for OperatorCreated<'_> {
    fn log(&self) {
        tracing::debug!(operator = self.operator, object = self.object, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "operator",
            span_name = name,
            operator = self.operator,
            object = self.object,
        )
    }
}

/// An operator ran and its outputs were cached.
///
/// # Log Level
/// `debug!` - Per-evaluation diagnostics
///
/// # Example
/// ```
/// use dpf_client::observability::messages::operator::OperatorEvaluated;
/// use std::time::Duration;
///
/// let msg = OperatorEvaluated {
///     operator: "min_max",
///     evaluation: 2,
///     duration: Duration::from_micros(850),
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct OperatorEvaluated<'a> {
    pub operator: &'a str,
    pub evaluation: u64,
    pub duration: Duration,
}

impl Display for OperatorEvaluated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' evaluated (run {}) in {:?}",
            self.operator, self.evaluation, self.duration
        )
    }
}

impl StructuredLog for OperatorEvaluated<'_> {
    fn log(&self) {
        tracing::debug!(
            operator = self.operator,
            evaluation = self.evaluation,
            duration_us = self.duration.as_micros() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "operator_evaluated",
            span_name = name,
            operator = self.operator,
            evaluation = self.evaluation,
        )
    }
}

/// An operator failed while evaluating.
///
/// # Log Level
/// `warn!` - The failure is returned to the client as well
pub struct OperatorFailed<'a> {
    pub operator: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for OperatorFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Operator '{}' failed: {}", self.operator, self.error)
    }
}

impl StructuredLog for OperatorFailed<'_> {
    fn log(&self) {
        tracing::warn!(operator = self.operator, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "operator_failed",
            span_name = name,
            operator = self.operator,
            error = %self.error,
        )
    }
}

/// A specification was fetched from the backend and cached.
///
/// # Log Level
/// `trace!` - Cache bookkeeping
pub struct SpecificationCached<'a> {
    pub operator: &'a str,
    pub version: &'a str,
}

impl Display for SpecificationCached<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cached specification of '{}' for server version {}",
            self.operator, self.version
        )
    }
}

impl StructuredLog for SpecificationCached<'_> {
    fn log(&self) {
        tracing::trace!(operator = self.operator, version = self.version, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("specification", span_name = name, operator = self.operator)
    }
}
