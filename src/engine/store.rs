// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-session object table with reference counts.
//!
//! Every entity a client can name lives here under an [`ObjectId`]. Client
//! handles own one reference each; operator bindings, workflow membership and
//! recorded workflows own references too, so a graph stays alive while any
//! part of it is reachable. Removing an entity releases what it held.

use std::collections::HashMap;
use std::sync::Arc;

use super::graph::OperatorNode;
use super::workflow::WorkflowNode;
use crate::data::{ObjectId, Value, ValueType};
use crate::errors::{DpfError, Result};

pub(crate) enum Entity {
    Data(Arc<Value>),
    Operator(OperatorNode),
    Workflow(WorkflowNode),
}

impl Entity {
    pub fn value_type(&self) -> ValueType {
        match self {
            Entity::Data(value) => value.value_type(),
            Entity::Operator(_) => ValueType::Operator,
            Entity::Workflow(_) => ValueType::Workflow,
        }
    }

    /// Ids this entity keeps alive.
    fn held(&self) -> Vec<ObjectId> {
        match self {
            Entity::Data(_) => Vec::new(),
            Entity::Operator(node) => node.held_objects(),
            Entity::Workflow(node) => node.operators().to_vec(),
        }
    }
}

struct Slot {
    entity: Entity,
    refs: u32,
}

#[derive(Default)]
pub(crate) struct ObjectStore {
    slots: HashMap<ObjectId, Slot>,
    next_id: u64,
}

impl ObjectStore {
    /// Store `entity` with one reference, owned by the caller.
    pub fn insert(&mut self, entity: Entity) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        self.slots.insert(id, Slot { entity, refs: 1 });
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn add_ref(&mut self, id: ObjectId) -> Result<()> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or_else(|| DpfError::stale_reference(format!("object {id}")))?;
        slot.refs += 1;
        Ok(())
    }

    /// Drop one reference. Unknown ids are ignored so that releasing twice
    /// is harmless.
    pub fn release(&mut self, id: ObjectId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(slot) = self.slots.get_mut(&id) else {
                tracing::debug!(object = id.0, "release of unknown object ignored");
                continue;
            };
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs == 0 {
                if let Some(slot) = self.slots.remove(&id) {
                    pending.extend(slot.entity.held());
                }
            }
        }
    }

    pub fn get(&self, id: ObjectId) -> Result<&Entity> {
        self.slots
            .get(&id)
            .map(|slot| &slot.entity)
            .ok_or_else(|| DpfError::stale_reference(format!("object {id}")))
    }

    pub fn refs(&self, id: ObjectId) -> u32 {
        self.slots.get(&id).map_or(0, |slot| slot.refs)
    }

    pub fn value_type(&self, id: ObjectId) -> Result<ValueType> {
        Ok(self.get(id)?.value_type())
    }

    pub fn data(&self, id: ObjectId) -> Result<Arc<Value>> {
        match self.get(id)? {
            Entity::Data(value) => Ok(value.clone()),
            other => Err(DpfError::invalid_argument(format!(
                "object {id} is a {}, not a data object",
                other.value_type()
            ))),
        }
    }

    pub fn operator(&self, id: ObjectId) -> Result<&OperatorNode> {
        match self.get(id)? {
            Entity::Operator(node) => Ok(node),
            other => Err(DpfError::invalid_argument(format!(
                "object {id} is a {}, not an operator",
                other.value_type()
            ))),
        }
    }

    pub fn operator_mut(&mut self, id: ObjectId) -> Result<&mut OperatorNode> {
        match self.slots.get_mut(&id).map(|slot| &mut slot.entity) {
            Some(Entity::Operator(node)) => Ok(node),
            Some(other) => Err(DpfError::invalid_argument(format!(
                "object {id} is a {}, not an operator",
                other.value_type()
            ))),
            None => Err(DpfError::stale_reference(format!("object {id}"))),
        }
    }

    pub fn workflow(&self, id: ObjectId) -> Result<&WorkflowNode> {
        match self.get(id)? {
            Entity::Workflow(node) => Ok(node),
            other => Err(DpfError::invalid_argument(format!(
                "object {id} is a {}, not a workflow",
                other.value_type()
            ))),
        }
    }

    pub fn workflow_mut(&mut self, id: ObjectId) -> Result<&mut WorkflowNode> {
        match self.slots.get_mut(&id).map(|slot| &mut slot.entity) {
            Some(Entity::Workflow(node)) => Ok(node),
            Some(other) => Err(DpfError::invalid_argument(format!(
                "object {id} is a {}, not a workflow",
                other.value_type()
            ))),
            None => Err(DpfError::stale_reference(format!("object {id}"))),
        }
    }

    pub fn operators(&self) -> impl Iterator<Item = (ObjectId, &OperatorNode)> {
        self.slots.iter().filter_map(|(id, slot)| match &slot.entity {
            Entity::Operator(node) => Some((*id, node)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn count(&self, ty: ValueType) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.entity.value_type() == ty)
            .count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
