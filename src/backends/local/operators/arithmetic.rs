// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::FIELD_OR_CONTAINER;
use crate::data::{Collection, Field, LabelSpace, TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};

const OPERAND: TypeSet = FIELD_OR_CONTAINER.union(TypeSet::single(ValueType::Double));

/// Entity-wise sum of two fields matched by id.
///
/// The result keeps the scoping of the left operand; ids missing on the right
/// are copied unchanged. A double operand is added to every component.
#[derive(Debug, Default)]
pub struct AddOperator;

fn add_fields(name: &str, a: &Field, b: &Field) -> Result<Field> {
    if a.component_count() != b.component_count() {
        return Err(DpfError::evaluation_failed(
            name,
            format!(
                "cannot add fields of {} and {} components",
                a.component_count(),
                b.component_count()
            ),
        ));
    }
    let mut out = a.clone();
    if a.scoping().ids() == b.scoping().ids() {
        for (x, y) in out.data_mut().iter_mut().zip(b.data()) {
            *x += y;
        }
        return Ok(out);
    }
    for (index, id) in a.scoping().ids().iter().enumerate() {
        let Some(rhs) = b.get_entity_data_by_id(*id) else {
            continue;
        };
        let summed: Vec<f64> = a
            .get_entity_data(index)
            .unwrap_or_default()
            .iter()
            .zip(rhs)
            .map(|(x, y)| x + y)
            .collect();
        out.set_entity_data(index, &summed)?;
    }
    Ok(out)
}

fn shift(field: &Field, k: f64) -> Field {
    let mut out = field.clone();
    out.data_mut().iter_mut().for_each(|x| *x += k);
    out
}

fn apply_each(
    container: &Collection<Field>,
    mut f: impl FnMut(&LabelSpace, &Field) -> Result<Field>,
) -> Result<Collection<Field>> {
    let mut out = Collection::new(container.labels().iter().cloned());
    for (label_space, field) in container.iter() {
        out.add_entry(label_space.clone(), f(label_space, field)?)?;
    }
    Ok(out)
}

impl OperatorImpl for AddOperator {
    fn specification(&self) -> Specification {
        Specification::new("Computes the sum of two fields, fields containers or a field and a double.")
            .input(0, PinSpec::required("fieldA", OPERAND, "left operand"))
            .input(1, PinSpec::required("fieldB", OPERAND, "right operand"))
            .output(0, PinSpec::required("field", FIELD_OR_CONTAINER, "sum"))
            .category("math")
            .scripting_name("add")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let name = ctx.name().to_string();
        let (a, b) = match (ctx.input(0), ctx.input(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(DpfError::evaluation_failed(&name, "both operands are required")),
        };
        let sum = match (a, b) {
            (Value::Field(a), Value::Field(b)) => Value::Field(add_fields(&name, a, b)?),
            (Value::Field(f), Value::Double(k)) | (Value::Double(k), Value::Field(f)) => {
                Value::Field(shift(f, *k))
            }
            (Value::FieldsContainer(a), Value::FieldsContainer(b)) => {
                Value::FieldsContainer(apply_each(a, |label_space, field| {
                    add_fields(&name, field, b.get_entry(label_space)?)
                })?)
            }
            (Value::FieldsContainer(c), Value::Field(f)) | (Value::Field(f), Value::FieldsContainer(c)) => {
                Value::FieldsContainer(apply_each(c, |_, field| add_fields(&name, field, f))?)
            }
            (Value::FieldsContainer(c), Value::Double(k)) | (Value::Double(k), Value::FieldsContainer(c)) => {
                Value::FieldsContainer(apply_each(c, |_, field| Ok(shift(field, *k)))?)
            }
            (a, b) => {
                return Err(DpfError::evaluation_failed(
                    &name,
                    format!("cannot add {} and {}", a.value_type(), b.value_type()),
                ))
            }
        };
        Ok(Outputs::from([(0, sum)]))
    }
}

/// Multiplies every component by a factor.
#[derive(Debug, Default)]
pub struct ScaleOperator;

impl OperatorImpl for ScaleOperator {
    fn specification(&self) -> Specification {
        Specification::new("Scales a field or fields container by a constant factor.")
            .input(0, PinSpec::required("field", FIELD_OR_CONTAINER, "field to scale"))
            .input(
                1,
                PinSpec::required("ponderation", TypeSet::single(ValueType::Double), "factor"),
            )
            .output(0, PinSpec::required("field", FIELD_OR_CONTAINER, "scaled field"))
            .category("math")
            .scripting_name("scale")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let factor = *ctx.input_as::<f64>(1)?;
        let scale = |field: &Field| {
            let mut out = field.clone();
            out.data_mut().iter_mut().for_each(|x| *x *= factor);
            out
        };
        let scaled = match ctx.input(0) {
            Some(Value::Field(field)) => Value::Field(scale(field)),
            Some(Value::FieldsContainer(container)) => {
                Value::FieldsContainer(apply_each(container, |_, field| Ok(scale(field)))?)
            }
            _ => Value::Field(ctx.input_as::<Field>(0)?.clone()),
        };
        Ok(Outputs::from([(0, scaled)]))
    }
}
