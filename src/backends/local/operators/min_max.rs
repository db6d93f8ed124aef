// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Component-wise extremes over all entities of a field or fields container.
//!
//! The incremental variants fold each evaluation into the extremes seen
//! since the last reset, so feeding them a field chunk by chunk gives the
//! same answer as one pass over the whole field.

use super::{overall_field, FIELD};
use crate::data::{Collection, Field, TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use std::collections::BTreeMap;

const FIELDS_CONTAINER: TypeSet = TypeSet::single(ValueType::FieldsContainer);

fn extremes<'a>(name: &str, fields: impl IntoIterator<Item = &'a Field>) -> Result<(Field, Field)> {
    let mut template: Option<&Field> = None;
    let mut min = Vec::new();
    let mut max = Vec::new();
    let mut entities = 0;
    for field in fields {
        entities += field.len();
        let components = field.component_count();
        match template {
            None => {
                min = vec![f64::INFINITY; components];
                max = vec![f64::NEG_INFINITY; components];
                template = Some(field);
            }
            Some(first) if first.component_count() != components => {
                return Err(DpfError::evaluation_failed(
                    name,
                    "fields with different component counts cannot be compared",
                ));
            }
            Some(_) => {}
        }
        for entity in field.data().chunks(components.max(1)) {
            for (c, value) in entity.iter().enumerate() {
                min[c] = min[c].min(*value);
                max[c] = max[c].max(*value);
            }
        }
    }
    let template = template.ok_or_else(|| DpfError::evaluation_failed(name, "no field to reduce"))?;
    if entities == 0 {
        return Err(DpfError::evaluation_failed(name, "fields have no entities"));
    }
    Ok((overall_field(template, min)?, overall_field(template, max)?))
}

fn outputs(min: Field, max: Field) -> Outputs {
    Outputs::from([(0, Value::Field(min)), (1, Value::Field(max))])
}

fn fold(name: &str, previous: Outputs, current: Outputs) -> Result<Outputs> {
    let pick = |outputs: &Outputs, pin: u32| -> Result<Field> {
        match outputs.get(&pin) {
            Some(Value::Field(field)) => Ok(field.clone()),
            _ => Err(DpfError::evaluation_failed(name, format!("output pin {pin} is not a field"))),
        }
    };
    let (min_a, max_a) = (pick(&previous, 0)?, pick(&previous, 1)?);
    let (min_b, max_b) = (pick(&current, 0)?, pick(&current, 1)?);
    let (min, _) = extremes(name, [&min_a, &min_b])?;
    let (_, max) = extremes(name, [&max_a, &max_b])?;
    Ok(outputs(min, max))
}

fn specification(input: PinSpec, incremental: bool) -> Specification {
    let description = if incremental {
        "Component-wise minimum and maximum, accumulated across evaluations until reset."
    } else {
        "Component-wise minimum and maximum over all entities."
    };
    Specification::new(description)
        .input(0, input)
        .output(0, PinSpec::required("field_min", FIELD, "minimum per component"))
        .output(1, PinSpec::required("field_max", FIELD, "maximum per component"))
        .category("min_max")
}

/// `min_max` and `min_max_inc` over a single field.
#[derive(Debug, Default)]
pub struct MinMaxOperator {
    incremental: bool,
}

impl MinMaxOperator {
    pub fn one_shot() -> Self {
        Self { incremental: false }
    }

    pub fn incremental() -> Self {
        Self { incremental: true }
    }
}

impl OperatorImpl for MinMaxOperator {
    fn specification(&self) -> Specification {
        let scripting = if self.incremental { "min_max_inc" } else { "min_max" };
        specification(PinSpec::required("field", FIELD, "field to reduce"), self.incremental)
            .scripting_name(scripting)
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let field = ctx.input_as::<Field>(0)?;
        let (min, max) = extremes(ctx.name(), [field])?;
        Ok(outputs(min, max))
    }

    fn is_incremental(&self, _config: &BTreeMap<String, Value>) -> bool {
        self.incremental
    }

    fn accumulate(&self, previous: Outputs, current: Outputs) -> Result<Outputs> {
        fold("min_max_inc", previous, current)
    }
}

/// `min_max_fc` and `min_max_fc_inc`: extremes over every field of a
/// container.
#[derive(Debug, Default)]
pub struct MinMaxFcOperator {
    incremental: bool,
}

impl MinMaxFcOperator {
    pub fn one_shot() -> Self {
        Self { incremental: false }
    }

    pub fn incremental() -> Self {
        Self { incremental: true }
    }
}

impl OperatorImpl for MinMaxFcOperator {
    fn specification(&self) -> Specification {
        let scripting = if self.incremental { "min_max_fc_inc" } else { "min_max_fc" };
        specification(
            PinSpec::required("fields_container", FIELDS_CONTAINER, "fields to reduce"),
            self.incremental,
        )
        .scripting_name(scripting)
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let container = ctx.input_as::<Collection<Field>>(0)?;
        let (min, max) = extremes(ctx.name(), container.iter().map(|(_, field)| field))?;
        Ok(outputs(min, max))
    }

    fn is_incremental(&self, _config: &BTreeMap<String, Value>) -> bool {
        self.incremental
    }

    fn accumulate(&self, previous: Outputs, current: Outputs) -> Result<Outputs> {
        fold("min_max_fc_inc", previous, current)
    }
}
