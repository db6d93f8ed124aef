// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for workflow composition and chunked evaluation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Two workflows were chained into a new one.
///
/// # Log Level
/// `debug!` - Graph construction detail
pub struct WorkflowChained {
    pub operators: usize,
    pub inputs: usize,
    pub outputs: usize,
}

impl Display for WorkflowChained {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Chained workflow with {} operators, {} inputs, {} outputs",
            self.operators, self.inputs, self.outputs
        )
    }
}

impl StructuredLog for WorkflowChained {
    fn log(&self) {
        tracing::debug!(
            operators = self.operators,
            inputs = self.inputs,
            outputs = self.outputs,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("workflow_chain", span_name = name, operators = self.operators)
    }
}

/// A workflow was recorded under an identifier for later loading.
///
/// # Log Level
/// `info!` - Session state change
///
/// # Example
/// ```
/// use dpf_client::observability::messages::workflow::WorkflowRecorded;
///
/// let msg = WorkflowRecorded {
///     identifier: "stress-envelope",
///     replaced: false,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct WorkflowRecorded<'a> {
    pub identifier: &'a str,
    pub replaced: bool,
}

impl Display for WorkflowRecorded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.replaced {
            write!(f, "Recorded workflow '{}' (replacing previous)", self.identifier)
        } else {
            write!(f, "Recorded workflow '{}'", self.identifier)
        }
    }
}

impl StructuredLog for WorkflowRecorded<'_> {
    fn log(&self) {
        tracing::info!(identifier = self.identifier, replaced = self.replaced, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("workflow_record", span_name = name, identifier = self.identifier)
    }
}

/// The end operator of a chunked graph has no known incremental variant.
///
/// # Log Level
/// `warn!` - Results may be wrong
pub struct IncrementalVariantMissing<'a> {
    pub operator: &'a str,
}

impl Display for IncrementalVariantMissing<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' has no known incremental variant; chunked results may differ from a one-shot evaluation",
            self.operator
        )
    }
}

impl StructuredLog for IncrementalVariantMissing<'_> {
    fn log(&self) {
        tracing::warn!(operator = self.operator, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("incremental_variant", span_name = name, operator = self.operator)
    }
}

/// The chunk size was derived from a single-id evaluation.
///
/// # Log Level
/// `debug!` - Sizing detail
pub struct ChunkSizeEstimated {
    pub bytes_per_id: u64,
    pub max_bytes: u64,
    pub chunk_size: usize,
}

impl Display for ChunkSizeEstimated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Estimated {} bytes per id; {} ids per chunk fit in {} bytes",
            self.bytes_per_id, self.chunk_size, self.max_bytes
        )
    }
}

impl StructuredLog for ChunkSizeEstimated {
    fn log(&self) {
        tracing::debug!(
            bytes_per_id = self.bytes_per_id,
            max_bytes = self.max_bytes,
            chunk_size = self.chunk_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("chunk_size", span_name = name, chunk_size = self.chunk_size)
    }
}

/// A chunked for-each graph was built around an operator chain.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ChunkedGraphBuilt<'a> {
    pub start: &'a str,
    pub end: &'a str,
    pub ids: usize,
    pub chunk_size: usize,
}

impl Display for ChunkedGraphBuilt<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Split '{}' -> '{}' over {} ids in chunks of {}",
            self.start, self.end, self.ids, self.chunk_size
        )
    }
}

impl StructuredLog for ChunkedGraphBuilt<'_> {
    fn log(&self) {
        tracing::info!(
            start = self.start,
            end = self.end,
            ids = self.ids,
            chunk_size = self.chunk_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "chunked_graph",
            span_name = name,
            start = self.start,
            end = self.end,
        )
    }
}
