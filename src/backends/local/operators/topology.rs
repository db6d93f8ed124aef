// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::data::{TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};

/// Describes a workflow of the session: its operators, operator-to-operator
/// connections, data connections and exposed pins.
#[derive(Debug, Default)]
pub struct WorkflowTopologyOperator;

impl OperatorImpl for WorkflowTopologyOperator {
    fn specification(&self) -> Specification {
        Specification::new("Gives the topology of a workflow as a generic data container.")
            .input(
                0,
                PinSpec::required("workflow", TypeSet::single(ValueType::Workflow), "workflow to describe"),
            )
            .output(
                0,
                PinSpec::required(
                    "workflow_topology",
                    TypeSet::single(ValueType::GenericDataContainer),
                    "operators, operator_connections, data_connections, exposed_inputs, exposed_outputs",
                ),
            )
            .category("utility")
            .scripting_name("workflow_topology")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let workflow = match ctx.input(0) {
            Some(Value::Workflow(id)) => *id,
            Some(other) => {
                return Err(DpfError::pin_type_mismatch(
                    ctx.name(),
                    0,
                    ValueType::Workflow,
                    other.value_type(),
                ))
            }
            None => return Err(DpfError::missing_input(ctx.name(), 0, "workflow")),
        };
        let topology = ctx.graph().describe_workflow(workflow)?;
        Ok(Outputs::from([(0, Value::GenericDataContainer(topology))]))
    }
}
