// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The contract between the engine and an operator implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::{DataType, GenericDataContainer, ObjectId, Value};
use crate::engine::Binding;
use crate::errors::{DpfError, Result};
use crate::protocol::Specification;

/// Produced values, by output pin.
pub type Outputs = BTreeMap<u32, Value>;

/// A backend operator implementation: built-ins, plug-in exports, stubs.
///
/// `run` is synchronous and sees only its resolved inputs and config, plus
/// [`GraphAccess`] for control operators that drive other nodes.
pub trait OperatorImpl: Send + Sync {
    fn specification(&self) -> Specification;

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs>;

    /// Whether successive evaluations fold into one result until reset.
    fn is_incremental(&self, _config: &BTreeMap<String, Value>) -> bool {
        false
    }

    /// Fold `current` into the result accumulated so far.
    fn accumulate(&self, _previous: Outputs, current: Outputs) -> Result<Outputs> {
        Ok(current)
    }
}

/// Limited access to the session graph, for operators such as `for_each`.
pub trait GraphAccess {
    /// Evaluate `operator` (and what it depends on) and return all outputs.
    fn evaluate(&mut self, operator: ObjectId) -> Result<Outputs>;

    /// Drop cached outputs and accumulated state.
    fn reset(&mut self, operator: ObjectId) -> Result<()>;

    /// Latch `value` on a pin, returning what was bound before.
    fn rebind(&mut self, operator: ObjectId, pin: u32, value: Value) -> Result<Option<Binding>>;

    fn restore(&mut self, operator: ObjectId, pin: u32, previous: Option<Binding>) -> Result<()>;

    fn describe_workflow(&mut self, workflow: ObjectId) -> Result<GenericDataContainer>;
}

pub struct OperatorContext<'a> {
    name: &'a str,
    inputs: BTreeMap<u32, Arc<Value>>,
    config: &'a BTreeMap<String, Value>,
    graph: &'a mut dyn GraphAccess,
}

impl<'a> OperatorContext<'a> {
    pub fn new(
        name: &'a str,
        inputs: BTreeMap<u32, Arc<Value>>,
        config: &'a BTreeMap<String, Value>,
        graph: &'a mut dyn GraphAccess,
    ) -> Self {
        Self {
            name,
            inputs,
            config,
            graph,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn input(&self, pin: u32) -> Option<&Value> {
        self.inputs.get(&pin).map(Arc::as_ref)
    }

    pub fn input_as<T: DataType>(&self, pin: u32) -> Result<&T> {
        let value = self.input(pin).ok_or_else(|| {
            DpfError::new(
                crate::errors::ErrorKind::MissingInput,
                format!("input pin {pin} is not connected"),
            )
            .at(self.name, Some(pin))
        })?;
        value.downcast_ref::<T>().ok_or_else(|| {
            DpfError::pin_type_mismatch(self.name, pin, T::VALUE_TYPE, value.value_type())
        })
    }

    pub fn optional_input_as<T: DataType>(&self, pin: u32) -> Result<Option<&T>> {
        match self.input(pin) {
            None => Ok(None),
            Some(_) => self.input_as(pin).map(Some),
        }
    }

    /// Connected inputs from `first` upward, for variadic pins.
    pub fn inputs_from(&self, first: u32) -> impl Iterator<Item = (u32, &Value)> {
        self.inputs
            .range(first..)
            .map(|(pin, value)| (*pin, value.as_ref()))
    }

    /// Id of an operator passed by reference.
    pub fn operator_ref(&self, pin: u32) -> Result<ObjectId> {
        match self.input(pin) {
            Some(Value::Operator(id)) => Ok(*id),
            Some(other) => Err(DpfError::pin_type_mismatch(
                self.name,
                pin,
                "{operator}",
                other.value_type(),
            )),
            None => Err(DpfError::new(
                crate::errors::ErrorKind::MissingInput,
                format!("input pin {pin} is not connected"),
            )
            .at(self.name, Some(pin))),
        }
    }

    pub fn config(&self, name: &str) -> Option<&Value> {
        self.config.get(name)
    }

    pub fn config_bool(&self, name: &str) -> bool {
        matches!(self.config.get(name), Some(Value::Bool(true)))
    }

    pub fn graph(&mut self) -> &mut dyn GraphAccess {
        &mut *self.graph
    }
}
