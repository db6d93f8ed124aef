// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Server side of lazy reads: summaries, per-entity access, chunked bulk
//! reads and collection or container queries on stored data objects.

use std::sync::Arc;

use super::graph::publish;
use super::store::{Entity, ObjectStore};
use crate::data::{ObjectId, Value};
use crate::errors::{DpfError, Result};
use crate::protocol::{DataInfo, DataRequest, ObjectInfo, Reply};

/// Apply `$body` to whichever collection `$value` holds.
macro_rules! with_collection {
    ($value:expr, $c:ident => $body:expr, $other:ident => $fallback:expr) => {
        match $value {
            Value::FieldsContainer($c) => $body,
            Value::ScopingsContainer($c) => $body,
            Value::MeshesContainer($c) => $body,
            Value::PropertyFieldsContainer($c) => $body,
            Value::GenericDataContainersContainer($c) => $body,
            Value::AnyCollection($c) => $body,
            $other => $fallback,
        }
    };
}

fn not_a(expected: &str, value: &Value) -> DpfError {
    DpfError::invalid_argument(format!("{} is not a {expected}", value.value_type()))
}

pub(crate) fn info(value: &Value) -> DataInfo {
    let mut info = DataInfo {
        value_type: value.value_type(),
        len: 1,
        data_len: 1,
        component_count: None,
        location: None,
        unit: None,
        name: None,
        labels: Vec::new(),
    };
    match value {
        Value::Field(f) => {
            info.len = f.len();
            info.data_len = f.data().len();
            info.component_count = Some(f.component_count());
            info.location = Some(f.location().clone());
            info.unit = Some(f.unit().to_string());
            info.name = Some(f.name().to_string());
        }
        Value::PropertyField(p) => {
            info.len = p.len();
            info.data_len = p.data().len();
            info.component_count = Some(p.component_count());
            info.location = Some(p.location().clone());
        }
        Value::StringField(s) => {
            info.len = s.len();
            info.data_len = s.len();
            info.component_count = Some(1);
            info.location = Some(s.location().clone());
        }
        Value::Scoping(s) => {
            info.len = s.len();
            info.data_len = s.len();
            info.location = Some(s.location().clone());
        }
        Value::MeshedRegion(m) => {
            info.len = m.node_count();
            info.data_len = m.nodes().data().len();
            info.unit = Some(m.unit().to_string());
        }
        Value::TimeFreqSupport(t) => {
            info.len = t.n_sets();
            info.data_len = t.n_sets();
        }
        Value::IntVector(v) => {
            info.len = v.len();
            info.data_len = v.len();
        }
        Value::DoubleVector(v) => {
            info.len = v.len();
            info.data_len = v.len();
        }
        Value::GenericDataContainer(g) => {
            info.len = g.len();
            info.data_len = g.len();
        }
        other => with_collection!(other,
            c => {
                info.len = c.len();
                info.data_len = c.len();
                info.labels = c.labels().to_vec();
            },
            _scalar => {}
        ),
    }
    info
}

fn entity_data(value: &Value, index: usize) -> Result<Option<Value>> {
    Ok(match value {
        Value::Field(f) => f.get_entity_data(index).map(|d| Value::DoubleVector(d.to_vec())),
        Value::PropertyField(p) => p.get_entity_data(index).map(|d| Value::IntVector(d.to_vec())),
        Value::StringField(s) => s.get_entity_data(index).map(Value::from),
        Value::Scoping(s) => s.id(index).map(Value::from),
        other => return Err(not_a("field or scoping", other)),
    })
}

fn entity_data_by_id(value: &Value, id: i32) -> Result<Option<Value>> {
    Ok(match value {
        Value::Field(f) => f.get_entity_data_by_id(id).map(|d| Value::DoubleVector(d.to_vec())),
        Value::PropertyField(p) => p.get_entity_data_by_id(id).map(|d| Value::IntVector(d.to_vec())),
        Value::StringField(s) => s.get_entity_data_by_id(id).map(Value::from),
        Value::Scoping(s) => s.index(id).map(|i| Value::Int(i as i64)),
        other => return Err(not_a("field or scoping", other)),
    })
}

fn window<T: Clone>(data: &[T], offset: usize, len: usize) -> Vec<T> {
    let start = offset.min(data.len());
    let end = offset.saturating_add(len).min(data.len());
    data[start..end].to_vec()
}

/// `len` values of the flat buffer from `offset`; short at the end.
pub(crate) fn read_chunk(value: &Value, offset: usize, len: usize) -> Result<Value> {
    Ok(match value {
        Value::Field(f) => Value::DoubleVector(window(f.data(), offset, len)),
        Value::PropertyField(p) => Value::IntVector(window(p.data(), offset, len)),
        Value::Scoping(s) => Value::IntVector(window(s.ids(), offset, len).into_iter().map(i64::from).collect()),
        Value::DoubleVector(v) => Value::DoubleVector(window(v, offset, len)),
        Value::IntVector(v) => Value::IntVector(window(v, offset, len)),
        other => return Err(not_a("numeric buffer", other)),
    })
}

fn store_value(store: &mut ObjectStore, value: Value) -> ObjectInfo {
    let value_type = value.value_type();
    let id = store.insert(Entity::Data(Arc::new(value)));
    ObjectInfo { id, value_type }
}

fn data(store: &ObjectStore, id: ObjectId) -> Result<Arc<Value>> {
    store.data(id)
}

pub(crate) fn handle(store: &mut ObjectStore, request: DataRequest) -> Result<Reply> {
    match request {
        DataRequest::Info { id } => Ok(Reply::Info(info(&*data(store, id)?))),
        DataRequest::EntityData { id, index } => {
            let value = data(store, id)?;
            let entity = entity_data(&value, index)?.ok_or_else(|| {
                DpfError::invalid_argument(format!("index {index} is out of range for {}", value.value_type()))
            })?;
            Ok(Reply::Value(entity))
        }
        DataRequest::EntityDataById { id, entity_id } => {
            let value = data(store, id)?;
            let entity = entity_data_by_id(&value, entity_id)?.ok_or_else(|| {
                DpfError::invalid_argument(format!("id {entity_id} is not in the scoping"))
            })?;
            Ok(Reply::Value(entity))
        }
        DataRequest::ReadChunk { id, offset, len } => Ok(Reply::Value(read_chunk(&*data(store, id)?, offset, len)?)),
        DataRequest::CollectionQuery { id, partial } => {
            let value = data(store, id)?;
            let entries: Vec<Value> = with_collection!(value.as_ref(),
                c => c.get_entries(&partial)?.into_iter().map(|e| Value::from(e.clone())).collect(),
                other => return Err(not_a("collection", other))
            );
            Ok(Reply::Objects(
                entries.into_iter().map(|entry| store_value(store, entry)).collect(),
            ))
        }
        DataRequest::CollectionEntry { id, label_space } => {
            let value = data(store, id)?;
            let entry: Value = with_collection!(value.as_ref(),
                c => Value::from(c.get_entry(&label_space)?.clone()),
                other => return Err(not_a("collection", other))
            );
            Ok(Reply::Output(publish(store, Arc::new(entry))))
        }
        DataRequest::LabelScoping { id, label } => {
            let value = data(store, id)?;
            let scoping = with_collection!(value.as_ref(),
                c => c.get_available_ids_for_label(&label)?,
                other => return Err(not_a("collection", other))
            );
            Ok(Reply::Value(Value::Scoping(scoping)))
        }
        DataRequest::ContainerProperty { id, name } => {
            let value = data(store, id)?;
            let Value::GenericDataContainer(container) = value.as_ref() else {
                return Err(not_a("generic data container", &value));
            };
            let property = container
                .get_property(&name)
                .cloned()
                .ok_or_else(|| DpfError::invalid_argument(format!("no property '{name}'")))?;
            Ok(Reply::Output(publish(store, Arc::new(property))))
        }
        DataRequest::ContainerTypes { id } => {
            let value = data(store, id)?;
            let Value::GenericDataContainer(container) = value.as_ref() else {
                return Err(not_a("generic data container", &value));
            };
            Ok(Reply::Types(container.property_types()))
        }
    }
}
