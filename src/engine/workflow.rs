// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Workflows: named boundaries over a set of operators in the session store.

use std::collections::BTreeMap;

use super::graph::{self, Binding};
use super::store::{Entity, ObjectStore};
use crate::data::{Collection, GenericDataContainer, LabelSpace, ObjectId, Value};
use crate::errors::{DpfError, Result};
use crate::protocol::{OutputValue, PinDirection, PinSource};

#[derive(Debug, Clone, Default)]
pub(crate) struct WorkflowNode {
    operators: Vec<ObjectId>,
    inputs: BTreeMap<String, Vec<(ObjectId, u32)>>,
    outputs: BTreeMap<String, (ObjectId, u32)>,
    exposed: Vec<(ObjectId, u32, PinDirection)>,
}

impl WorkflowNode {
    pub fn operators(&self) -> &[ObjectId] {
        &self.operators
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.keys().cloned().collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }
}

fn add_member(store: &mut ObjectStore, workflow: ObjectId, operator: ObjectId) -> Result<()> {
    store.operator(operator)?;
    if store.workflow(workflow)?.operators.contains(&operator) {
        return Ok(());
    }
    store.add_ref(operator)?;
    store.workflow_mut(workflow)?.operators.push(operator);
    Ok(())
}

pub(crate) fn add_operators(store: &mut ObjectStore, workflow: ObjectId, operators: &[ObjectId]) -> Result<()> {
    for operator in operators {
        add_member(store, workflow, *operator)?;
    }
    Ok(())
}

/// Alias `name` to an input pin. Repeating the call with other pins makes
/// the name fan out to all of them.
pub(crate) fn set_input_name(
    store: &mut ObjectStore,
    workflow: ObjectId,
    name: String,
    operator: ObjectId,
    pin: u32,
) -> Result<()> {
    let node = store.operator(operator)?;
    if node.spec().input_pin(pin).is_none() {
        return Err(DpfError::invalid_argument(format!("no input pin {pin}")).at(node.name(), Some(pin)));
    }
    add_member(store, workflow, operator)?;
    let targets = store.workflow_mut(workflow)?.inputs.entry(name).or_default();
    if !targets.contains(&(operator, pin)) {
        targets.push((operator, pin));
    }
    Ok(())
}

pub(crate) fn set_output_name(
    store: &mut ObjectStore,
    workflow: ObjectId,
    name: String,
    operator: ObjectId,
    pin: u32,
) -> Result<()> {
    let node = store.operator(operator)?;
    if node.spec().output_pin(pin).is_none() {
        return Err(DpfError::invalid_argument(format!("no output pin {pin}")).at(node.name(), Some(pin)));
    }
    match store.workflow(workflow)?.outputs.get(&name) {
        Some(existing) if *existing != (operator, pin) => {
            return Err(DpfError::invalid_argument(format!(
                "output name '{name}' is already used"
            )));
        }
        _ => {}
    }
    add_member(store, workflow, operator)?;
    store.workflow_mut(workflow)?.outputs.insert(name, (operator, pin));
    Ok(())
}

pub(crate) fn expose_pin(
    store: &mut ObjectStore,
    workflow: ObjectId,
    operator: ObjectId,
    pin: u32,
    direction: PinDirection,
) -> Result<()> {
    let node = store.operator(operator)?;
    let exists = match direction {
        PinDirection::Input => node.spec().input_pin(pin).is_some(),
        PinDirection::Output => node.spec().output_pin(pin).is_some(),
    };
    if !exists {
        return Err(DpfError::invalid_argument(format!("no {direction:?} pin {pin}").to_lowercase())
            .at(node.name(), Some(pin)));
    }
    add_member(store, workflow, operator)?;
    let wf = store.workflow_mut(workflow)?;
    if !wf.exposed.contains(&(operator, pin, direction)) {
        wf.exposed.push((operator, pin, direction));
    }
    Ok(())
}

/// Latch `source` on every pin aliased by `name`. Nothing changes unless all
/// of them accept it.
pub(crate) fn connect(store: &mut ObjectStore, workflow: ObjectId, name: &str, source: PinSource) -> Result<()> {
    let targets = store
        .workflow(workflow)?
        .inputs
        .get(name)
        .cloned()
        .ok_or_else(|| DpfError::invalid_argument(format!("workflow has no input named '{name}'")))?;

    let mut prepared = Vec::with_capacity(targets.len());
    for (operator, pin) in targets {
        let binding = graph::prepare_binding(store, operator, pin, source.clone())?;
        prepared.push((operator, pin, binding));
    }
    for (operator, pin, binding) in prepared {
        graph::apply_binding(store, operator, pin, binding)?;
    }
    Ok(())
}

pub(crate) fn output(store: &mut ObjectStore, workflow: ObjectId, name: &str) -> Result<OutputValue> {
    let (operator, pin) = store
        .workflow(workflow)?
        .outputs
        .get(name)
        .copied()
        .ok_or_else(|| DpfError::invalid_argument(format!("workflow has no output named '{name}'")))?;
    graph::output(store, operator, pin)
}

/// Compose two workflows: each `(output, input)` pair of `map` feeds an
/// output of `first` into the matching input of `second`.
///
/// The result exposes the inputs of `first` plus the inputs of `second` not
/// consumed by the map, and the outputs of both; on an output name clash
/// `second` wins.
pub(crate) fn chain(
    store: &mut ObjectStore,
    first: ObjectId,
    second: ObjectId,
    map: &[(String, String)],
) -> Result<ObjectId> {
    let w1 = store.workflow(first)?.clone();
    let w2 = store.workflow(second)?.clone();

    let mut edges = Vec::new();
    for (out_name, in_name) in map {
        let (source, source_pin) = w1.outputs.get(out_name).copied().ok_or_else(|| {
            DpfError::invalid_argument(format!("first workflow has no output named '{out_name}'"))
        })?;
        let targets = w2.inputs.get(in_name).ok_or_else(|| {
            DpfError::invalid_argument(format!("second workflow has no input named '{in_name}'"))
        })?;
        for (operator, pin) in targets {
            let source = PinSource::Output {
                operator: source,
                pin: source_pin,
            };
            edges.push((*operator, *pin, graph::prepare_binding(store, *operator, *pin, source)?));
        }
    }
    for (operator, pin, binding) in edges {
        graph::apply_binding(store, operator, pin, binding)?;
    }

    let consumed: Vec<&String> = map.iter().map(|(_, input)| input).collect();
    let mut composed = WorkflowNode {
        inputs: w1.inputs.clone(),
        outputs: w1.outputs.clone(),
        ..WorkflowNode::default()
    };
    for (name, targets) in &w2.inputs {
        if consumed.contains(&name) {
            continue;
        }
        let merged = composed.inputs.entry(name.clone()).or_default();
        for target in targets {
            if !merged.contains(target) {
                merged.push(*target);
            }
        }
    }
    composed.outputs.extend(w2.outputs.clone());
    composed.exposed = w1.exposed.iter().chain(&w2.exposed).copied().collect();

    let id = store.insert(Entity::Workflow(WorkflowNode::default()));
    let members: Vec<ObjectId> = w1.operators.iter().chain(&w2.operators).copied().collect();
    add_operators(store, id, &members)?;
    let node = store.workflow_mut(id)?;
    node.inputs = composed.inputs;
    node.outputs = composed.outputs;
    node.exposed = composed.exposed;
    Ok(id)
}

/// Another workflow over the same operators.
pub(crate) fn duplicate(store: &mut ObjectStore, workflow: ObjectId) -> Result<ObjectId> {
    let node = store.workflow(workflow)?.clone();
    for operator in &node.operators {
        store.add_ref(*operator)?;
    }
    Ok(store.insert(Entity::Workflow(node)))
}

fn record(entries: Vec<GenericDataContainer>, label: &str) -> Result<Value> {
    let mut collection = Collection::new([label]);
    for (index, entry) in entries.into_iter().enumerate() {
        collection.add_entry(LabelSpace::from([(label, index as i32)]), entry)?;
    }
    Ok(Value::GenericDataContainersContainer(collection))
}

fn pin_entry(name: &str, operator: ObjectId, pin: u32) -> GenericDataContainer {
    GenericDataContainer::new()
        .with_property("name", name)
        .with_property("operator_id", operator.0 as i64)
        .with_property("pin", i64::from(pin))
}

/// Topology of a workflow as a generic data container with the properties
/// `operators`, `operator_connections`, `data_connections`,
/// `exposed_inputs` and `exposed_outputs`.
pub(crate) fn describe(store: &ObjectStore, workflow: ObjectId) -> Result<GenericDataContainer> {
    let wf = store.workflow(workflow)?;

    let mut operators = Vec::new();
    let mut operator_connections = Vec::new();
    let mut data_connections = Vec::new();
    for id in &wf.operators {
        let node = store.operator(*id)?;
        operators.push(
            GenericDataContainer::new()
                .with_property("id", id.0 as i64)
                .with_property("name", node.name()),
        );
        for (pin, binding) in node.bindings() {
            let target = |g: GenericDataContainer| {
                g.with_property("target_operator", id.0 as i64)
                    .with_property("target_pin", i64::from(*pin))
            };
            match binding {
                Binding::Upstream { operator, pin: out } if wf.operators.contains(operator) => {
                    operator_connections.push(target(
                        GenericDataContainer::new()
                            .with_property("source_operator", operator.0 as i64)
                            .with_property("source_pin", i64::from(*out)),
                    ));
                }
                Binding::Upstream { .. } => {
                    data_connections.push(target(
                        GenericDataContainer::new().with_property("data_type", "operator_output"),
                    ));
                }
                Binding::Constant(value) => {
                    data_connections.push(target(
                        GenericDataContainer::new()
                            .with_property("data_type", value.value_type().as_str()),
                    ));
                }
                Binding::Object(object) => {
                    let ty = store.value_type(*object)?;
                    data_connections.push(target(
                        GenericDataContainer::new().with_property("data_type", ty.as_str()),
                    ));
                }
            }
        }
    }

    let mut exposed_inputs = Vec::new();
    for (name, targets) in &wf.inputs {
        for (operator, pin) in targets {
            exposed_inputs.push(pin_entry(name, *operator, *pin));
        }
    }
    let mut exposed_outputs: Vec<GenericDataContainer> = wf
        .outputs
        .iter()
        .map(|(name, (operator, pin))| pin_entry(name, *operator, *pin))
        .collect();
    for (operator, pin, direction) in &wf.exposed {
        let node = store.operator(*operator)?;
        match direction {
            PinDirection::Input => {
                let name = node.spec().input_pin(*pin).map_or("", |p| p.name.as_str());
                exposed_inputs.push(pin_entry(name, *operator, *pin));
            }
            PinDirection::Output => {
                let name = node.spec().output_pin(*pin).map_or("", |p| p.name.as_str());
                exposed_outputs.push(pin_entry(name, *operator, *pin));
            }
        }
    }

    Ok(GenericDataContainer::new()
        .with_property("operators", record(operators, "operator")?)
        .with_property("operator_connections", record(operator_connections, "connection")?)
        .with_property("data_connections", record(data_connections, "connection")?)
        .with_property("exposed_inputs", record(exposed_inputs, "input")?)
        .with_property("exposed_outputs", record(exposed_outputs, "output")?))
}
