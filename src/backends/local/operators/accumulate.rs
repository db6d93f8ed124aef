// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{overall_field, FIELD};
use crate::data::{Field, Value};
use crate::errors::{DpfError, Result};
use crate::protocol::{ConfigOption, PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use std::collections::BTreeMap;

/// Component-wise sum over all entities of a field.
///
/// With the `incremental` config option set, sums from successive
/// evaluations add up until the operator is reset.
#[derive(Debug, Default)]
pub struct AccumulateOperator;

fn sum(field: &Field) -> Vec<f64> {
    let components = field.component_count().max(1);
    let mut totals = vec![0.0; components];
    for entity in field.data().chunks(components) {
        for (total, value) in totals.iter_mut().zip(entity) {
            *total += value;
        }
    }
    totals
}

impl OperatorImpl for AccumulateOperator {
    fn specification(&self) -> Specification {
        Specification::new("Sums a field over its entities, component by component.")
            .input(0, PinSpec::required("field", FIELD, "field to sum"))
            .output(0, PinSpec::required("field", FIELD, "one overall entity holding the sums"))
            .config(ConfigOption::new(
                "incremental",
                false,
                "accumulate across evaluations until reset",
            ))
            .category("math")
            .scripting_name("accumulate")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let field = ctx.input_as::<Field>(0)?;
        Ok(Outputs::from([(0, Value::Field(overall_field(field, sum(field))?))]))
    }

    fn is_incremental(&self, config: &BTreeMap<String, Value>) -> bool {
        matches!(config.get("incremental"), Some(Value::Bool(true)))
    }

    fn accumulate(&self, previous: Outputs, current: Outputs) -> Result<Outputs> {
        match (previous.get(&0), current.get(&0)) {
            (Some(Value::Field(before)), Some(Value::Field(now))) if before.len() == now.len() => {
                let mut total = now.clone();
                for (t, b) in total.data_mut().iter_mut().zip(before.data()) {
                    *t += b;
                }
                Ok(Outputs::from([(0, Value::Field(total))]))
            }
            _ => Err(DpfError::evaluation_failed(
                "accumulate",
                "accumulated and new sums have different shapes",
            )),
        }
    }
}
