// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in operators of the in-crate engine.
//!
//! These are enough to exercise the graph core from end to end: arithmetic
//! on fields, min/max and accumulation (each with an incremental flavour),
//! scoping algebra, and the control operators used by chunked evaluation.

mod accumulate;
mod arithmetic;
mod chunking;
mod forward;
mod min_max;
mod scoping;
mod topology;

pub use accumulate::AccumulateOperator;
pub use arithmetic::{AddOperator, ScaleOperator};
pub use chunking::{ChunkInForEachRangeOperator, ForEachOperator};
pub use forward::ForwardOperator;
pub use min_max::{MinMaxFcOperator, MinMaxOperator};
pub use scoping::{IntersectOperator, RescopeOperator, ScopingToFieldOperator, UnionOperator};
pub use topology::WorkflowTopologyOperator;

use crate::data::{Field, Location, Scoping, TypeSet, ValueType};
use crate::errors::Result;

pub(crate) const FIELD: TypeSet = TypeSet::single(ValueType::Field);
pub(crate) const FIELD_OR_CONTAINER: TypeSet =
    TypeSet::of(&[ValueType::Field, ValueType::FieldsContainer]);
pub(crate) const SCOPING: TypeSet = TypeSet::single(ValueType::Scoping);

/// One-entity field on the `overall` location, for reductions.
pub(crate) fn overall_field(template: &Field, values: Vec<f64>) -> Result<Field> {
    Ok(Field::new(
        template.dimensionality().clone(),
        Scoping::new(Location::Overall, vec![0]),
        values,
    )?
    .with_unit(template.unit()))
}
