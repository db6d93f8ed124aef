// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Evaluate an operator chain over a large scoping in bounded chunks.
//!
//! ```text
//!            chunk_in_for_each_range(start, scoping pin, S, k)
//!                               │ plan
//!                               ▼
//!   start ──► … ──► end ◄── for_each (body = incremental end)
//!                               │ outputs
//!                               ▼
//!                      forward ──► [rescope to S]
//! ```
//!
//! `for_each` rebinds the scoping pin of `start` to each chunk in turn and
//! evaluates `end` after each, so only `k` ids are in flight at a time. The
//! results are the same as a one-shot evaluation only when `end`
//! accumulates across evaluations.

use std::collections::BTreeMap;

use crate::data::{DataType, Scoping, ValueType};
use crate::errors::{DpfError, Result};
use crate::observability::messages::workflow::{
    ChunkSizeEstimated, ChunkedGraphBuilt, IncrementalVariantMissing,
};
use crate::observability::messages::StructuredLog;
use crate::operator::{Input, Operator};
use crate::remote::{adopt_output, Remote};
use crate::server::Server;

/// Streaming counterparts of operators that aggregate over all their ids.
pub const INCREMENTAL_VARIANTS: &[(&str, &str)] = &[
    ("min_max", "min_max_inc"),
    ("min_max_fc", "min_max_fc_inc"),
];

/// Config option that makes an operator accumulate across evaluations.
pub const INCREMENTAL_OPTION: &str = "incremental";

/// Default memory bound of one chunk's worth of `start` outputs.
pub const DEFAULT_MAX_BYTES: u64 = 1 << 30;

pub fn incremental_variant(name: &str) -> Option<&'static str> {
    INCREMENTAL_VARIANTS
        .iter()
        .find(|(plain, _)| *plain == name)
        .map(|(_, incremental)| *incremental)
}

fn is_incremental_variant(name: &str) -> bool {
    INCREMENTAL_VARIANTS.iter().any(|(_, inc)| *inc == name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingOptions {
    /// Bound used to derive the chunk size when none is given.
    pub max_bytes: u64,
    /// Ids per chunk; estimated from a one-id evaluation when `None`.
    pub chunk_size: Option<usize>,
    /// Input pin of `start` that takes the scoping; the first pin accepting
    /// a scoping when `None`.
    pub scoping_pin: Option<u32>,
    /// Rescope field outputs to the full scoping. Reductions on the
    /// `overall` location come through unchanged.
    pub rescope: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            chunk_size: None,
            scoping_pin: None,
            rescope: false,
        }
    }
}

impl ChunkingOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_scoping_pin(mut self, pin: u32) -> Self {
        self.scoping_pin = Some(pin);
        self
    }

    pub fn rescoped(mut self) -> Self {
        self.rescope = true;
        self
    }
}

/// The operators of a chunked evaluation. Outputs have the pin numbers of
/// the original `end` operator.
#[derive(Debug)]
pub struct ChunkedGraph {
    pub chunk_size: usize,
    pub chunk_count: usize,
    end: Operator,
    chunker: Operator,
    for_each: Operator,
    forward: Operator,
    rescoped: BTreeMap<u32, Operator>,
}

impl ChunkedGraph {
    /// The accumulating end operator driven by `for_each`.
    pub fn end(&self) -> &Operator {
        &self.end
    }

    pub fn chunker(&self) -> &Operator {
        &self.chunker
    }

    pub fn for_each(&self) -> &Operator {
        &self.for_each
    }

    /// The operator presenting output `pin`.
    pub fn output_operator(&self, pin: u32) -> &Operator {
        self.rescoped.get(&pin).unwrap_or(&self.forward)
    }

    fn output_pin(&self, pin: u32) -> u32 {
        if self.rescoped.contains_key(&pin) {
            0
        } else {
            pin
        }
    }

    /// Lazy edge from output `pin`, for wiring downstream operators.
    pub fn output_ref(&self, pin: u32) -> Input<'_> {
        self.output_operator(pin).output_ref(self.output_pin(pin))
    }

    pub async fn get_output<T: DataType>(&self, pin: u32) -> Result<T> {
        self.output_operator(pin)
            .get_output(self.output_pin(pin))
            .await
    }

    pub async fn get_output_remote<T: DataType>(&self, pin: u32) -> Result<Remote<T>> {
        self.output_operator(pin)
            .get_output_remote(self.output_pin(pin))
            .await
    }
}

fn scoping_pin(start: &Operator, options: &ChunkingOptions) -> Result<u32> {
    let pin = match options.scoping_pin {
        Some(pin) => pin,
        None => start
            .specification()
            .first_input_accepting(ValueType::Scoping)
            .ok_or_else(|| {
                DpfError::invalid_argument("no input pin accepts a scoping").at(start.name(), None)
            })?,
    };
    match start.input_types(pin) {
        Some(types) if types.contains(ValueType::Scoping) => Ok(pin),
        Some(types) => Err(DpfError::pin_type_mismatch(
            start.name(),
            pin,
            types,
            ValueType::Scoping,
        )),
        None => Err(DpfError::invalid_argument(format!("no input pin {pin}")).at(start.name(), Some(pin))),
    }
}

/// The end operator that accumulates across chunks: its known incremental
/// variant, or itself with `incremental` switched on, or itself as is.
async fn incremental_end(end: &Operator) -> Result<Operator> {
    if let Some(variant) = incremental_variant(end.name()) {
        return end.clone_as(variant).await;
    }
    let same = end.clone_as(end.name()).await?;
    if end.specification().config_option(INCREMENTAL_OPTION).is_some() {
        same.set_config(INCREMENTAL_OPTION, true).await?;
    } else if !is_incremental_variant(end.name()) {
        IncrementalVariantMissing {
            operator: end.name(),
        }
        .log();
    }
    Ok(same)
}

/// Evaluate a copy of `start` on the first id only and size chunks so one
/// chunk's outputs fit in `max_bytes`. The caller's `start` keeps its
/// bindings whatever the outcome.
async fn estimate_chunk_size(
    server: &Server,
    start: &Operator,
    pin: u32,
    scoping: &Scoping,
    max_bytes: u64,
) -> Result<usize> {
    let first = scoping
        .id(0)
        .ok_or_else(|| DpfError::invalid_argument("cannot chunk an empty scoping"))?;
    let sample = start.clone_as(start.name()).await?;
    sample
        .connect(pin, Scoping::new(scoping.location().clone(), vec![first]))
        .await?;

    let mut bytes_per_id = 0;
    let outputs: Vec<(u32, bool)> = sample
        .specification()
        .outputs
        .iter()
        .map(|(pin, spec)| (*pin, spec.optional))
        .collect();
    for (output, optional) in outputs {
        let value = match sample.raw_output(output).await {
            Ok(value) => value,
            Err(err) if optional => {
                tracing::debug!(pin = output, error = %err, "optional output skipped while sizing");
                continue;
            }
            Err(err) => return Err(err),
        };
        bytes_per_id += adopt_output(server, value).await?.byte_size().await?;
    }

    let chunk_size = (max_bytes / bytes_per_id.max(1)).clamp(1, scoping.len() as u64) as usize;
    ChunkSizeEstimated {
        bytes_per_id,
        max_bytes,
        chunk_size,
    }
    .log();
    Ok(chunk_size)
}

/// Build a graph evaluating `end` (fed, through any chain, by `start`) over
/// `scoping` in chunks.
///
/// The scoping pin of `start` is driven chunk by chunk; `end` is replaced by
/// its incremental variant so results accumulate. Without a known variant
/// the graph is still built, with a warning.
pub async fn split_workflow_in_chunks(
    start: &Operator,
    end: &Operator,
    scoping: &Scoping,
    options: ChunkingOptions,
) -> Result<ChunkedGraph> {
    let server = start.server()?;
    end.handle().ensure_on(&server)?;
    if scoping.is_empty() {
        return Err(DpfError::invalid_argument("cannot chunk an empty scoping"));
    }
    let pin = scoping_pin(start, &options)?;
    let chunk_size = match options.chunk_size {
        Some(0) => return Err(DpfError::invalid_argument("chunk size must be positive")),
        Some(size) => size.min(scoping.len()),
        None => estimate_chunk_size(&server, start, pin, scoping, options.max_bytes).await?,
    };

    let body = incremental_end(end).await?;

    let chunker = Operator::new(&server, "chunk_in_for_each_range").await?;
    chunker.connect(0, Input::operator_ref(start)).await?;
    chunker.connect(1, i64::from(pin)).await?;
    chunker.connect(2, scoping.clone()).await?;
    chunker.connect(3, chunk_size as i64).await?;

    let for_each = Operator::new(&server, "for_each").await?;
    for_each.connect(0, chunker.output_ref(0)).await?;
    for_each.connect(1, Input::operator_ref(&body)).await?;

    let forward = Operator::new(&server, "forward").await?;
    let outputs: Vec<(u32, bool)> = end
        .specification()
        .outputs
        .iter()
        .map(|(pin, spec)| (*pin, spec.types.contains(ValueType::Field)))
        .collect();
    for (output, _) in &outputs {
        forward.connect(*output, for_each.output_ref(*output)).await?;
    }

    let mut rescoped = BTreeMap::new();
    if options.rescope {
        for (output, is_field) in outputs {
            if is_field {
                let rescope = Operator::new(&server, "rescope").await?;
                rescope.connect(0, forward.output_ref(output)).await?;
                rescope.connect(1, scoping.clone()).await?;
                rescoped.insert(output, rescope);
            }
        }
    }

    let chunk_count = scoping.len().div_ceil(chunk_size);
    ChunkedGraphBuilt {
        start: start.name(),
        end: body.name(),
        ids: scoping.len(),
        chunk_size,
    }
    .log();
    Ok(ChunkedGraph {
        chunk_size,
        chunk_count,
        end: body,
        chunker,
        for_each,
        forward,
        rescoped,
    })
}
