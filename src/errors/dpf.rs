// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The error type shared by every layer, from the engine to the client handles.
//!
//! Errors travel across both transports as a `(kind, message, stack?)` triple
//! plus the failing operator and pin, and are rebuilt unchanged on the client.
//! Nothing in the core retries or swallows them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = DpfError> = std::result::Result<T, E>;

/// Category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Connection refused, dropped, malformed frame.
    Transport,
    /// Deadline missed. The backend may still be computing.
    Timeout,
    /// Requested feature absent from the backend.
    VersionMismatch,
    /// Operator name not registered.
    UnknownOperator,
    /// Value type absent from the pin's accepted set.
    PinTypeMismatch,
    /// Required pin unconnected at evaluation.
    MissingInput,
    /// The backend returned a domain-specific failure.
    EvaluationFailed,
    /// Remote object passed to the wrong session.
    CrossServerReference,
    /// Use after shutdown or after release.
    StaleReference,
    /// File transfer or plug-in load failure.
    Io,
    /// Bad index, unknown label, ambiguous lookup, duplicate name.
    InvalidArgument,
    /// Refused cast of a dynamically typed value.
    TypeMismatch,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::VersionMismatch => "version-mismatch",
            ErrorKind::UnknownOperator => "unknown-operator",
            ErrorKind::PinTypeMismatch => "pin-type-mismatch",
            ErrorKind::MissingInput => "missing-input",
            ErrorKind::EvaluationFailed => "evaluation-failed",
            ErrorKind::CrossServerReference => "cross-server-reference",
            ErrorKind::StaleReference => "stale-reference",
            ErrorKind::Io => "io",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Timeouts are a transport failure as far as callers are concerned.
    pub fn is_transport(self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = DpfError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "transport" => ErrorKind::Transport,
            "timeout" => ErrorKind::Timeout,
            "version-mismatch" => ErrorKind::VersionMismatch,
            "unknown-operator" => ErrorKind::UnknownOperator,
            "pin-type-mismatch" => ErrorKind::PinTypeMismatch,
            "missing-input" => ErrorKind::MissingInput,
            "evaluation-failed" => ErrorKind::EvaluationFailed,
            "cross-server-reference" => ErrorKind::CrossServerReference,
            "stale-reference" => ErrorKind::StaleReference,
            "io" => ErrorKind::Io,
            "invalid-argument" => ErrorKind::InvalidArgument,
            "type-mismatch" => ErrorKind::TypeMismatch,
            "cancelled" => ErrorKind::Cancelled,
            other => {
                return Err(DpfError::transport(format!(
                    "backend reported unknown error kind '{other}'"
                )))
            }
        };
        Ok(kind)
    }
}

/// A structured failure: kind, message, and where it happened when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", self.render(false))]
pub struct DpfError {
    pub kind: ErrorKind,
    pub message: String,
    pub operator: Option<String>,
    pub pin: Option<u32>,
    /// Backend-supplied stack, shown only by [`DpfError::verbose`].
    pub stack: Option<String>,
}

impl DpfError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operator: None,
            pin: None,
            stack: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn timeout(what: impl fmt::Display, after: std::time::Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("{what} timed out after {after:?}"))
    }

    pub fn version_mismatch(
        feature: impl fmt::Display,
        required: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorKind::VersionMismatch,
            format!("{feature} requires backend version {required}, server runs {actual}"),
        )
    }

    pub fn unknown_operator(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperator,
            format!("operator '{name}' is not registered on this server"),
        )
    }

    pub fn pin_type_mismatch(
        operator: &str,
        pin: u32,
        accepted: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        Self::new(
            ErrorKind::PinTypeMismatch,
            format!("pin accepts {accepted}, got {got}"),
        )
        .at(operator, Some(pin))
    }

    pub fn missing_input(operator: &str, pin: u32, pin_name: &str) -> Self {
        Self::new(
            ErrorKind::MissingInput,
            format!("required input '{pin_name}' is not connected"),
        )
        .at(operator, Some(pin))
    }

    pub fn evaluation_failed(operator: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluationFailed, message).at(operator, None)
    }

    pub fn cross_server(what: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::CrossServerReference,
            format!("{what} belongs to another server; deep-copy it first"),
        )
    }

    pub fn stale_reference(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::StaleReference, format!("{what} is no longer valid"))
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn type_mismatch(expected: impl fmt::Display, got: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, found {got}"),
        )
    }

    /// Attach the failing operator and, when known, its pin.
    pub fn at(mut self, operator: &str, pin: Option<u32>) -> Self {
        self.operator = Some(operator.to_string());
        if pin.is_some() {
            self.pin = pin;
        }
        self
    }

    /// Only fills the location if nothing deeper already recorded one.
    pub fn or_at(self, operator: &str) -> Self {
        if self.operator.is_some() {
            self
        } else {
            self.at(operator, None)
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn is_transport(&self) -> bool {
        self.kind.is_transport()
    }

    /// `Display` plus the backend stack, when there is one.
    pub fn verbose(&self) -> String {
        self.render(true)
    }

    fn render(&self, verbose: bool) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        match (&self.operator, self.pin) {
            (Some(op), Some(pin)) => out.push_str(&format!(" (at {op} pin {pin})")),
            (Some(op), None) => out.push_str(&format!(" (at {op})")),
            _ => {}
        }
        if verbose {
            if let Some(stack) = &self.stack {
                out.push_str("\n");
                out.push_str(stack);
            }
        }
        out
    }
}

impl From<std::io::Error> for DpfError {
    fn from(err: std::io::Error) -> Self {
        DpfError::io(err.to_string())
    }
}

impl From<bincode::Error> for DpfError {
    fn from(err: bincode::Error) -> Self {
        DpfError::transport(format!("malformed binary frame: {err}"))
    }
}

impl From<serde_json::Error> for DpfError {
    fn from(err: serde_json::Error) -> Self {
        DpfError::transport(format!("malformed JSON frame: {err}"))
    }
}

impl From<tonic::transport::Error> for DpfError {
    fn from(err: tonic::transport::Error) -> Self {
        DpfError::transport(err.to_string())
    }
}

impl From<tonic::Status> for DpfError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => {
                DpfError::new(ErrorKind::Timeout, status.message().to_string())
            }
            tonic::Code::Cancelled => {
                DpfError::new(ErrorKind::Cancelled, status.message().to_string())
            }
            code => DpfError::transport(format!("{code:?}: {}", status.message())),
        }
    }
}

impl From<crate::errors::ConfigError> for DpfError {
    fn from(err: crate::errors::ConfigError) -> Self {
        DpfError::invalid_argument(err.to_string())
    }
}

impl From<crate::errors::PluginError> for DpfError {
    fn from(err: crate::errors::PluginError) -> Self {
        DpfError::io(err.to_string())
    }
}
