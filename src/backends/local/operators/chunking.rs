// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Control operators behind chunked evaluation.
//!
//! `chunk_in_for_each_range` only describes the work: which operator pin to
//! drive and the scoping chunks to drive it with. `for_each` does the
//! driving, rebinding that pin once per chunk and evaluating its body after
//! each rebind. The body is reset first, so an incremental body accumulates
//! exactly the chunks of this run.

use super::SCOPING;
use crate::data::{Collection, GenericDataContainer, LabelSpace, ObjectId, Scoping, TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};

const OPERATOR: TypeSet = TypeSet::single(ValueType::Operator);
const INT: TypeSet = TypeSet::single(ValueType::Int);
const PLAN: TypeSet = TypeSet::single(ValueType::GenericDataContainer);

/// Label of the chunk index in the produced scopings container.
pub const CHUNK_LABEL: &str = "chunk";

#[derive(Debug, Default)]
pub struct ChunkInForEachRangeOperator;

/// Split `scoping` into consecutive chunks of at most `size` ids.
pub(crate) fn chunks(scoping: &Scoping, size: usize) -> Result<Collection<Scoping>> {
    let mut out = Collection::new([CHUNK_LABEL]);
    for (index, start) in (0..scoping.len()).step_by(size.max(1)).enumerate() {
        out.add_entry(
            LabelSpace::from([(CHUNK_LABEL, index as i32)]),
            scoping.slice(start, size),
        )?;
    }
    Ok(out)
}

impl OperatorImpl for ChunkInForEachRangeOperator {
    fn specification(&self) -> Specification {
        Specification::new("Splits a scoping into chunks to iterate an operator pin over.")
            .input(0, PinSpec::required("operator_to_iterate", OPERATOR, "operator whose pin is driven"))
            .input(1, PinSpec::required("pin_index", INT, "input pin receiving each chunk"))
            .input(2, PinSpec::required("scoping", SCOPING, "ids to split"))
            .input(3, PinSpec::required("chunk_size", INT, "ids per chunk"))
            .output(0, PinSpec::required("output", PLAN, "iteration plan for for_each"))
            .category("logic")
            .scripting_name("chunk_in_for_each_range")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let target = ctx.operator_ref(0)?;
        let pin = *ctx.input_as::<i64>(1)?;
        let scoping = ctx.input_as::<Scoping>(2)?;
        let size = *ctx.input_as::<i64>(3)?;
        if size < 1 {
            return Err(DpfError::invalid_argument(format!("chunk size must be positive, got {size}"))
                .at(ctx.name(), Some(3)));
        }
        if pin < 0 {
            return Err(DpfError::invalid_argument(format!("pin index must not be negative, got {pin}"))
                .at(ctx.name(), Some(1)));
        }
        let plan = GenericDataContainer::new()
            .with_property("operator", Value::Operator(target))
            .with_property("pin", pin)
            .with_property("chunks", chunks(scoping, size as usize)?);
        Ok(Outputs::from([(0, Value::GenericDataContainer(plan))]))
    }
}

#[derive(Debug, Default)]
pub struct ForEachOperator;

struct Plan {
    target: ObjectId,
    pin: u32,
    chunks: Collection<Scoping>,
}

fn plan(name: &str, container: &GenericDataContainer) -> Result<Plan> {
    let target = match container.get_property("operator") {
        Some(Value::Operator(id)) => *id,
        _ => {
            return Err(DpfError::invalid_argument("iteration plan names no operator").at(name, Some(0)))
        }
    };
    let pin = container.get_property_as::<i64>("pin")?;
    let pin = u32::try_from(pin)
        .map_err(|_| DpfError::invalid_argument(format!("pin index {pin} is out of range")).at(name, Some(0)))?;
    let chunks = container.get_property_as::<Collection<Scoping>>("chunks")?;
    Ok(Plan { target, pin, chunks })
}

impl OperatorImpl for ForEachOperator {
    fn specification(&self) -> Specification {
        Specification::new("Evaluates a body once per chunk of an iteration plan; outputs the last result.")
            .input(0, PinSpec::required("iterable", PLAN, "plan from chunk_in_for_each_range"))
            .input(1, PinSpec::required("body", OPERATOR, "operator evaluated after each chunk"))
            .output(0, PinSpec::required("output", TypeSet::ANY, "body output of the same pin").ellipsis())
            .category("logic")
            .scripting_name("for_each")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let name = ctx.name().to_string();
        let plan = plan(&name, ctx.input_as::<GenericDataContainer>(0)?)?;
        let body = ctx.operator_ref(1)?;
        if plan.chunks.is_empty() {
            return Err(DpfError::evaluation_failed(&name, "iteration plan has no chunks"));
        }

        let graph = ctx.graph();
        graph.reset(body)?;
        let mut original = None;
        let mut last = Ok(Outputs::new());
        for (_, chunk) in plan.chunks.iter() {
            match graph.rebind(plan.target, plan.pin, Value::Scoping(chunk.clone())) {
                Ok(previous) => {
                    if original.is_none() {
                        original = Some(previous);
                    }
                }
                Err(err) => {
                    last = Err(err);
                    break;
                }
            }
            last = graph.evaluate(body);
            if last.is_err() {
                break;
            }
        }
        if let Some(previous) = original {
            graph.restore(plan.target, plan.pin, previous)?;
        }
        last
    }
}
