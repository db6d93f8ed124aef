// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scoping algebra and rescoping.

use super::{FIELD, FIELD_OR_CONTAINER, SCOPING};
use crate::data::{Collection, Field, Location, Scoping, TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use std::collections::HashSet;

/// Field whose data are the ids of a scoping, one scalar per id.
#[derive(Debug, Default)]
pub struct ScopingToFieldOperator;

impl OperatorImpl for ScopingToFieldOperator {
    fn specification(&self) -> Specification {
        Specification::new("Creates a scalar field holding each id of a scoping as its value.")
            .input(0, PinSpec::required("scoping", SCOPING, "ids to convert"))
            .output(0, PinSpec::required("field", FIELD, "one value per id"))
            .category("scoping")
            .scripting_name("to_field")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let scoping = ctx.input_as::<Scoping>(0)?;
        let data = scoping.ids().iter().map(|id| f64::from(*id)).collect();
        let field = Field::scalar(scoping.clone(), data)?;
        Ok(Outputs::from([(0, Value::Field(field))]))
    }
}

/// Ids present in both scopings, in the order of the first, plus the ids
/// only present in the first.
#[derive(Debug, Default)]
pub struct IntersectOperator;

impl OperatorImpl for IntersectOperator {
    fn specification(&self) -> Specification {
        Specification::new("Intersection of two scopings.")
            .input(0, PinSpec::required("scopingA", SCOPING, ""))
            .input(1, PinSpec::required("scopingB", SCOPING, ""))
            .output(0, PinSpec::required("intersection", SCOPING, "ids in both"))
            .output(1, PinSpec::required("scopingA_min_intersection", SCOPING, "ids only in A"))
            .category("scoping")
            .scripting_name("intersect")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let a = ctx.input_as::<Scoping>(0)?;
        let b = ctx.input_as::<Scoping>(1)?;
        let (both, left_only): (Vec<i32>, Vec<i32>) = a.ids().iter().partition(|id| b.contains(**id));
        Ok(Outputs::from([
            (0, Value::Scoping(Scoping::new(a.location().clone(), both))),
            (1, Value::Scoping(Scoping::new(a.location().clone(), left_only))),
        ]))
    }
}

/// Ids of the first scoping followed by the new ids of the second.
#[derive(Debug, Default)]
pub struct UnionOperator;

impl OperatorImpl for UnionOperator {
    fn specification(&self) -> Specification {
        Specification::new("Union of two scopings without duplicates.")
            .input(0, PinSpec::required("scopingA", SCOPING, ""))
            .input(1, PinSpec::required("scopingB", SCOPING, ""))
            .output(0, PinSpec::required("union", SCOPING, ""))
            .category("scoping")
            .scripting_name("union")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let a = ctx.input_as::<Scoping>(0)?;
        let b = ctx.input_as::<Scoping>(1)?;
        let mut seen = HashSet::new();
        let ids = a
            .ids()
            .iter()
            .chain(b.ids())
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        Ok(Outputs::from([(0, Value::Scoping(Scoping::new(a.location().clone(), ids)))]))
    }
}

/// Restricts or reorders a field onto another scoping.
///
/// Ids absent from the field take `default_value` on every component, or
/// fail the evaluation when no default is connected. Fields on the
/// `overall` location hold no per-id entities and pass through unchanged.
#[derive(Debug, Default)]
pub struct RescopeOperator;

fn rescope(name: &str, field: &Field, scoping: &Scoping, default: Option<f64>) -> Result<Field> {
    if field.location() == &Location::Overall {
        return Ok(field.clone());
    }
    let components = field.component_count();
    let mut data = Vec::with_capacity(scoping.len() * components);
    for id in scoping.ids() {
        match (field.get_entity_data_by_id(*id), default) {
            (Some(values), _) => data.extend_from_slice(values),
            (None, Some(value)) => data.extend(std::iter::repeat(value).take(components)),
            (None, None) => {
                return Err(DpfError::evaluation_failed(
                    name,
                    format!("id {id} has no data and no default value is connected"),
                )
                .at(name, Some(2)))
            }
        }
    }
    let mut scoping = scoping.clone();
    scoping.set_location(field.location().clone());
    let mut out = Field::new(field.dimensionality().clone(), scoping, data)?
        .with_name(field.name())
        .with_unit(field.unit());
    out.set_time_freq_support(field.time_freq_support().cloned());
    Ok(out)
}

impl OperatorImpl for RescopeOperator {
    fn specification(&self) -> Specification {
        Specification::new("Rescopes a field or fields container on the given scoping.")
            .input(0, PinSpec::required("fields", FIELD_OR_CONTAINER, ""))
            .input(1, PinSpec::required("mesh_scoping", SCOPING, "target ids"))
            .input(
                2,
                PinSpec::optional(
                    "default_value",
                    TypeSet::single(ValueType::Double),
                    "value of ids missing from the input",
                ),
            )
            .output(0, PinSpec::required("fields", FIELD_OR_CONTAINER, ""))
            .category("scoping")
            .scripting_name("rescope")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let scoping = ctx.input_as::<Scoping>(1)?;
        let default = ctx.optional_input_as::<f64>(2)?.copied();
        let name = ctx.name();
        let out = match ctx.input(0) {
            Some(Value::FieldsContainer(container)) => {
                let mut out = Collection::new(container.labels().iter().cloned());
                for (label_space, field) in container.iter() {
                    out.add_entry(label_space.clone(), rescope(name, field, scoping, default)?)?;
                }
                Value::FieldsContainer(out)
            }
            _ => Value::Field(rescope(name, ctx.input_as::<Field>(0)?, scoping, default)?),
        };
        Ok(Outputs::from([(0, out)]))
    }
}
