// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operator nodes, pin bindings and lazy evaluation.
//!
//! Outputs are computed on request by a post-order walk over upstream
//! bindings and cached per node. Any change to a node's inputs or config
//! clears its cache and the caches of everything downstream, found through a
//! reverse-dependency map built from the bindings.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::store::{Entity, ObjectStore};
use crate::data::{GenericDataContainer, ObjectId, TypeSet, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::observability::messages::operator::{OperatorEvaluated, OperatorFailed};
use crate::observability::messages::StructuredLog;
use crate::protocol::{ObjectInfo, OperatorState, OperatorStats, OutputValue, PinSource, Specification};
use crate::traits::{GraphAccess, OperatorContext, OperatorImpl, Outputs};

/// What an input pin is bound to on the backend.
#[derive(Debug, Clone)]
pub enum Binding {
    Constant(Arc<Value>),
    /// A data object, or an operator or workflow passed by reference.
    Object(ObjectId),
    Upstream { operator: ObjectId, pin: u32 },
}

impl Binding {
    fn held(&self) -> Option<ObjectId> {
        match self {
            Binding::Constant(_) => None,
            Binding::Object(id) => Some(*id),
            Binding::Upstream { operator, .. } => Some(*operator),
        }
    }
}

pub(crate) struct OperatorNode {
    name: String,
    implementation: Arc<dyn OperatorImpl>,
    spec: Arc<Specification>,
    config: BTreeMap<String, Value>,
    bindings: BTreeMap<u32, Binding>,
    cache: Option<BTreeMap<u32, Arc<Value>>>,
    accumulated: Option<Outputs>,
    state: OperatorState,
    evaluations: u64,
}

impl OperatorNode {
    pub fn new(name: String, implementation: Arc<dyn OperatorImpl>, spec: Arc<Specification>) -> Self {
        Self {
            name,
            implementation,
            config: spec.default_config(),
            spec,
            bindings: BTreeMap::new(),
            cache: None,
            accumulated: None,
            state: OperatorState::Unconfigured,
            evaluations: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &Arc<Specification> {
        &self.spec
    }

    pub fn bindings(&self) -> &BTreeMap<u32, Binding> {
        &self.bindings
    }

    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn stats(&self) -> OperatorStats {
        OperatorStats {
            state: self.state,
            evaluations: self.evaluations,
        }
    }

    pub fn held_objects(&self) -> Vec<ObjectId> {
        self.bindings.values().filter_map(Binding::held).collect()
    }

    fn settle_state(&mut self) {
        self.state = if self.bindings.is_empty() {
            OperatorState::Unconfigured
        } else {
            OperatorState::Wired
        };
    }

    fn cached(&self, pin: u32) -> Option<Arc<Value>> {
        self.cache.as_ref().and_then(|c| c.get(&pin)).cloned()
    }
}

/// Validate `source` against the pin and build its binding. The graph is
/// left untouched, so a refused connection changes nothing.
pub(crate) fn prepare_binding(
    store: &ObjectStore,
    operator: ObjectId,
    pin: u32,
    source: PinSource,
) -> Result<Binding> {
    let node = store.operator(operator)?;
    let pin_spec = node.spec.input_pin(pin).ok_or_else(|| {
        DpfError::invalid_argument(format!("no input pin {pin}")).at(&node.name, Some(pin))
    })?;

    let (binding, produced) = match source {
        PinSource::Value(Value::Operator(id)) => {
            store.operator(id)?;
            (Binding::Object(id), TypeSet::single(ValueType::Operator))
        }
        PinSource::Value(Value::Workflow(id)) => {
            store.workflow(id)?;
            (Binding::Object(id), TypeSet::single(ValueType::Workflow))
        }
        PinSource::Value(value) => {
            let ty = value.value_type();
            (Binding::Constant(Arc::new(value)), TypeSet::single(ty))
        }
        PinSource::Object(id) => (Binding::Object(id), TypeSet::single(store.value_type(id)?)),
        PinSource::Output { operator: upstream, pin: out } => {
            if upstream == operator {
                return Err(DpfError::invalid_argument("an operator cannot feed itself")
                    .at(&node.name, Some(pin)));
            }
            let up = store.operator(upstream)?;
            let out_spec = up.spec.output_pin(out).ok_or_else(|| {
                DpfError::invalid_argument(format!("no output pin {out}")).at(&up.name, Some(out))
            })?;
            (
                Binding::Upstream {
                    operator: upstream,
                    pin: out,
                },
                out_spec.types,
            )
        }
    };

    if !pin_spec.types.intersects(produced) {
        return Err(DpfError::pin_type_mismatch(
            &node.name,
            pin,
            pin_spec.types,
            produced,
        ));
    }
    Ok(binding)
}

/// Replace the binding of a pin, moving object references accordingly.
pub(crate) fn apply_binding(
    store: &mut ObjectStore,
    operator: ObjectId,
    pin: u32,
    binding: Binding,
) -> Result<()> {
    if let Some(held) = binding.held() {
        store.add_ref(held)?;
    }
    let previous = store.operator_mut(operator)?.bindings.insert(pin, binding);
    if let Some(held) = previous.as_ref().and_then(Binding::held) {
        store.release(held);
    }
    invalidate(store, operator);
    Ok(())
}

pub(crate) fn connect(
    store: &mut ObjectStore,
    operator: ObjectId,
    pin: u32,
    source: PinSource,
) -> Result<()> {
    let binding = prepare_binding(store, operator, pin, source)?;
    apply_binding(store, operator, pin, binding)
}

pub(crate) fn disconnect(store: &mut ObjectStore, operator: ObjectId, pin: u32) -> Result<()> {
    let previous = store.operator_mut(operator)?.bindings.remove(&pin);
    if let Some(held) = previous.as_ref().and_then(Binding::held) {
        store.release(held);
    }
    invalidate(store, operator);
    Ok(())
}

/// Clear the cache of `origin` and of every node that depends on it.
pub(crate) fn invalidate(store: &mut ObjectStore, origin: ObjectId) {
    let mut dependents: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for (id, node) in store.operators() {
        for held in node.held_objects() {
            dependents.entry(held).or_default().push(id);
        }
    }

    let mut pending = vec![origin];
    let mut seen = HashSet::new();
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Ok(node) = store.operator_mut(id) {
            node.cache = None;
            // A node invalidated by its own control flow finishes normally.
            if node.state != OperatorState::Evaluating {
                node.settle_state();
            }
        }
        if let Some(next) = dependents.get(&id) {
            pending.extend(next.iter().copied());
        }
    }
}

/// Evaluate `id` unless cached, after everything it depends on.
pub(crate) fn evaluate(
    store: &mut ObjectStore,
    id: ObjectId,
    visiting: &mut Vec<ObjectId>,
) -> Result<()> {
    let node = store.operator(id)?;
    if node.cache.is_some() {
        return Ok(());
    }
    if visiting.contains(&id) {
        return Err(DpfError::evaluation_failed(
            &node.name,
            "dependency cycle through this operator",
        ));
    }
    visiting.push(id);
    let result = run_node(store, id, visiting);
    visiting.pop();
    result
}

fn run_node(store: &mut ObjectStore, id: ObjectId, visiting: &mut Vec<ObjectId>) -> Result<()> {
    let node = store.operator(id)?;
    let name = node.name.clone();
    let implementation = node.implementation.clone();
    let spec = node.spec.clone();
    let config = node.config.clone();
    let bindings = node.bindings.clone();

    if let Some((pin, pin_spec)) = spec
        .inputs
        .iter()
        .find(|(pin, pin_spec)| !pin_spec.optional && !bindings.contains_key(pin))
    {
        store.operator_mut(id)?.state = OperatorState::Failed;
        return Err(DpfError::missing_input(&name, *pin, &pin_spec.name));
    }

    for binding in bindings.values() {
        if let Binding::Upstream { operator, .. } = binding {
            evaluate(store, *operator, visiting)?;
        }
    }

    let mut inputs = BTreeMap::new();
    for (pin, binding) in &bindings {
        inputs.insert(*pin, resolve(store, &name, *pin, binding)?);
    }

    store.operator_mut(id)?.state = OperatorState::Evaluating;
    let started = Instant::now();
    let outcome = {
        let mut graph = SessionGraph {
            store: &mut *store,
            visiting: &mut *visiting,
        };
        let mut ctx = OperatorContext::new(&name, inputs, &config, &mut graph);
        implementation.run(&mut ctx)
    };

    let node = store.operator_mut(id)?;
    node.evaluations += 1;
    let outcome = match outcome {
        Ok(current) if implementation.is_incremental(&config) => {
            let folded = match node.accumulated.take() {
                Some(previous) => implementation.accumulate(previous, current),
                None => Ok(current),
            };
            if let Ok(folded) = &folded {
                node.accumulated = Some(folded.clone());
            }
            folded
        }
        other => other,
    };

    match outcome {
        Ok(outputs) => {
            node.cache = Some(
                outputs
                    .into_iter()
                    .map(|(pin, value)| (pin, Arc::new(value)))
                    .collect(),
            );
            node.state = OperatorState::Evaluated;
            OperatorEvaluated {
                operator: &name,
                evaluation: node.evaluations,
                duration: started.elapsed(),
            }
            .log();
            Ok(())
        }
        Err(err) => {
            node.state = OperatorState::Failed;
            let err = err.or_at(&name);
            OperatorFailed {
                operator: &name,
                error: &err,
            }
            .log();
            Err(err)
        }
    }
}

fn resolve(store: &ObjectStore, consumer: &str, pin: u32, binding: &Binding) -> Result<Arc<Value>> {
    match binding {
        Binding::Constant(value) => Ok(value.clone()),
        Binding::Object(id) => match store.get(*id)? {
            Entity::Data(value) => Ok(value.clone()),
            Entity::Operator(_) => Ok(Arc::new(Value::Operator(*id))),
            Entity::Workflow(_) => Ok(Arc::new(Value::Workflow(*id))),
        },
        Binding::Upstream { operator, pin: out } => {
            let up = store.operator(*operator)?;
            up.cached(*out).ok_or_else(|| {
                DpfError::evaluation_failed(
                    consumer,
                    format!("upstream '{}' produced nothing on output pin {out}", up.name),
                )
                .at(consumer, Some(pin))
            })
        }
    }
}

/// Hand a value to the client: inline when small, as a new object otherwise.
pub(crate) fn publish(store: &mut ObjectStore, value: Arc<Value>) -> OutputValue {
    let value_type = value.value_type();
    if value_type.is_bulky() {
        let id = store.insert(Entity::Data(value));
        OutputValue::Object(ObjectInfo { id, value_type })
    } else {
        OutputValue::Inline(value.as_ref().clone())
    }
}

pub(crate) fn output(store: &mut ObjectStore, id: ObjectId, pin: u32) -> Result<OutputValue> {
    let node = store.operator(id)?;
    if node.spec.output_pin(pin).is_none() {
        return Err(DpfError::invalid_argument(format!("no output pin {pin}")).at(&node.name, Some(pin)));
    }
    evaluate(store, id, &mut Vec::new())?;
    let node = store.operator(id)?;
    let value = node.cached(pin).ok_or_else(|| {
        DpfError::evaluation_failed(&node.name, format!("output pin {pin} was not produced"))
    })?;
    Ok(publish(store, value))
}

/// Drop cached outputs and accumulated state.
pub(crate) fn reset(store: &mut ObjectStore, id: ObjectId) -> Result<()> {
    let node = store.operator_mut(id)?;
    node.cache = None;
    node.accumulated = None;
    invalidate(store, id);
    Ok(())
}

pub(crate) fn set_config(store: &mut ObjectStore, id: ObjectId, name: &str, value: Value) -> Result<()> {
    let node = store.operator_mut(id)?;
    let expected = node
        .spec
        .config_option(name)
        .map(|option| option.value_type())
        .ok_or_else(|| {
            DpfError::invalid_argument(format!("no config option '{name}'")).at(&node.name, None)
        })?;
    if expected != value.value_type() {
        return Err(DpfError::type_mismatch(expected, value.value_type()).at(&node.name, None));
    }
    node.config.insert(name.to_string(), value);
    invalidate(store, id);
    Ok(())
}

/// New operator with another implementation, wired and configured like `id`.
pub(crate) fn clone_with(
    store: &mut ObjectStore,
    id: ObjectId,
    name: String,
    implementation: Arc<dyn OperatorImpl>,
    spec: Arc<Specification>,
) -> Result<ObjectId> {
    let source = store.operator(id)?;
    let bindings = source.bindings.clone();
    let overrides = source.config.clone();

    let mut node = OperatorNode::new(name, implementation, spec);
    for (option, value) in overrides {
        let compatible = node
            .spec
            .config_option(&option)
            .is_some_and(|o| o.value_type() == value.value_type());
        if compatible {
            node.config.insert(option, value);
        }
    }
    for held in bindings.values().filter_map(Binding::held) {
        store.add_ref(held)?;
    }
    node.bindings = bindings;
    node.settle_state();
    Ok(store.insert(Entity::Operator(node)))
}

/// [`GraphAccess`] over a session store, carrying the evaluation stack so
/// control operators cannot recurse into themselves.
pub(crate) struct SessionGraph<'a> {
    pub store: &'a mut ObjectStore,
    pub visiting: &'a mut Vec<ObjectId>,
}

impl GraphAccess for SessionGraph<'_> {
    fn evaluate(&mut self, operator: ObjectId) -> Result<Outputs> {
        evaluate(self.store, operator, self.visiting)?;
        let node = self.store.operator(operator)?;
        Ok(node
            .cache
            .iter()
            .flatten()
            .map(|(pin, value)| (*pin, value.as_ref().clone()))
            .collect())
    }

    fn reset(&mut self, operator: ObjectId) -> Result<()> {
        reset(self.store, operator)
    }

    fn rebind(&mut self, operator: ObjectId, pin: u32, value: Value) -> Result<Option<Binding>> {
        let binding = prepare_binding(self.store, operator, pin, PinSource::Value(value))?;
        if let Some(held) = binding.held() {
            self.store.add_ref(held)?;
        }
        let previous = self.store.operator_mut(operator)?.bindings.insert(pin, binding);
        invalidate(self.store, operator);
        Ok(previous)
    }

    fn restore(&mut self, operator: ObjectId, pin: u32, previous: Option<Binding>) -> Result<()> {
        let node = self.store.operator_mut(operator)?;
        let current = match previous {
            Some(binding) => node.bindings.insert(pin, binding),
            None => node.bindings.remove(&pin),
        };
        if let Some(held) = current.as_ref().and_then(Binding::held) {
            self.store.release(held);
        }
        invalidate(self.store, operator);
        Ok(())
    }

    fn describe_workflow(&mut self, workflow: ObjectId) -> Result<GenericDataContainer> {
        super::workflow::describe(self.store, workflow)
    }
}
