// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One client session: its object store and the state explicit calls set on
//! it (recorded workflows, temporary directories, log tee).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use super::graph::{self, OperatorNode};
use super::registry::OperatorRegistry;
use super::store::{Entity, ObjectStore};
use super::workflow::{self, WorkflowNode};
use crate::data::{ObjectId, Value, ValueType};
use crate::errors::{DpfError, Result};
use crate::observability::messages::operator::OperatorCreated;
use crate::observability::messages::workflow::{WorkflowChained, WorkflowRecorded};
use crate::observability::messages::StructuredLog;
use crate::protocol::{
    decode_blob, encode_blob, features, ObjectInfo, ObjectRequest, OperatorRequest, Reply,
    SessionId, SessionStats, Version, WorkflowRequest,
};

pub(crate) struct Session {
    id: SessionId,
    pub(crate) store: ObjectStore,
    records: HashMap<String, ObjectId>,
    tmp_dirs: Vec<PathBuf>,
    log_file: Option<File>,
}

fn object(store: &ObjectStore, id: ObjectId) -> Result<Reply> {
    Ok(Reply::Object(ObjectInfo {
        id,
        value_type: store.value_type(id)?,
    }))
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            store: ObjectStore::default(),
            records: HashMap::new(),
            tmp_dirs: Vec::new(),
            log_file: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            live_objects: self.store.len(),
            operators: self.store.count(ValueType::Operator),
            workflows: self.store.count(ValueType::Workflow),
            evaluations: self.store.operators().map(|(_, node)| node.evaluations()).sum(),
        }
    }

    /// Create a fresh directory under `root` owned by this session.
    pub fn make_tmp_dir(&mut self, root: &std::path::Path) -> Result<PathBuf> {
        let dir = root.join(format!("dpf-session-{}-{}", self.id, self.tmp_dirs.len()));
        std::fs::create_dir_all(&dir)?;
        self.tmp_dirs.push(dir.clone());
        Ok(dir)
    }

    /// Start or stop teeing session events to `path`.
    pub fn set_log_file(&mut self, path: Option<&str>) -> Result<()> {
        self.log_file = match path {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| DpfError::io(format!("cannot open log file '{path}': {e}")))?,
            ),
            None => None,
        };
        Ok(())
    }

    /// Append one event line to the log tee, if any. Write failures drop
    /// the tee rather than failing the request that produced the line.
    pub fn tee(&mut self, line: &dyn std::fmt::Display) {
        if let Some(file) = self.log_file.as_mut() {
            if let Err(err) = writeln!(file, "{line}") {
                tracing::warn!(session = self.id, error = %err, "session log tee disabled");
                self.log_file = None;
            }
        }
    }

    /// Release everything the session owns. Returns how many objects were
    /// still alive.
    pub fn close(&mut self) -> usize {
        let dropped = self.store.len();
        self.store.clear();
        self.records.clear();
        self.log_file = None;
        for dir in self.tmp_dirs.drain(..) {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                tracing::debug!(path = %dir.display(), error = %err, "temporary directory not removed");
            }
        }
        dropped
    }

    pub fn handle_object(&mut self, request: ObjectRequest) -> Result<Reply> {
        let store = &mut self.store;
        match request {
            ObjectRequest::Create { value } => {
                if matches!(value, Value::Operator(_) | Value::Workflow(_)) {
                    return Err(DpfError::invalid_argument(
                        "operators and workflows are created by their own requests",
                    ));
                }
                let id = store.insert(Entity::Data(Arc::new(value)));
                object(store, id)
            }
            ObjectRequest::Fetch { id } => match store.get(id)? {
                Entity::Data(value) => Ok(Reply::Value(value.as_ref().clone())),
                Entity::Operator(_) => Ok(Reply::Value(Value::Operator(id))),
                Entity::Workflow(_) => Ok(Reply::Value(Value::Workflow(id))),
            },
            ObjectRequest::Release { ids } => {
                for id in ids {
                    store.release(id);
                }
                Ok(Reply::Unit)
            }
            ObjectRequest::AddRef { id } => {
                store.add_ref(id)?;
                Ok(Reply::Unit)
            }
            ObjectRequest::Serialize { id } => Ok(Reply::Bytes(encode_blob(&*store.data(id)?)?)),
            ObjectRequest::Deserialize { blob } => {
                let value = decode_blob(&blob)?;
                let id = store.insert(Entity::Data(Arc::new(value)));
                object(store, id)
            }
            ObjectRequest::ByteSize { id } => Ok(Reply::Size(store.data(id)?.byte_size())),
        }
    }

    pub fn handle_operator(&mut self, request: OperatorRequest, registry: &OperatorRegistry) -> Result<Reply> {
        let store = &mut self.store;
        match request {
            OperatorRequest::Create { name } => {
                let (implementation, spec) = registry.lookup(&name)?;
                let id = store.insert(Entity::Operator(OperatorNode::new(name.clone(), implementation, spec)));
                OperatorCreated {
                    operator: &name,
                    object: id.0,
                }
                .log();
                object(store, id)
            }
            OperatorRequest::Specification { name } => {
                let (_, spec) = registry.lookup(&name)?;
                Ok(Reply::Specification(spec.as_ref().clone()))
            }
            OperatorRequest::Connect {
                operator,
                pin,
                source,
            } => {
                graph::connect(store, operator, pin, source)?;
                Ok(Reply::Unit)
            }
            OperatorRequest::Disconnect { operator, pin } => {
                graph::disconnect(store, operator, pin)?;
                Ok(Reply::Unit)
            }
            OperatorRequest::SetConfig {
                operator,
                name,
                value,
            } => {
                graph::set_config(store, operator, &name, value)?;
                Ok(Reply::Unit)
            }
            OperatorRequest::Config { operator } => Ok(Reply::Config(store.operator(operator)?.config().clone())),
            OperatorRequest::Output { operator, pin } => Ok(Reply::Output(graph::output(store, operator, pin)?)),
            OperatorRequest::Run { operator } => {
                graph::evaluate(store, operator, &mut Vec::new())?;
                Ok(Reply::Unit)
            }
            OperatorRequest::Reset { operator } => {
                graph::reset(store, operator)?;
                Ok(Reply::Unit)
            }
            OperatorRequest::Stats { operator } => Ok(Reply::OperatorStats(store.operator(operator)?.stats())),
            OperatorRequest::CloneWith { operator, name } => {
                let (implementation, spec) = registry.lookup(&name)?;
                let id = graph::clone_with(store, operator, name, implementation, spec)?;
                object(store, id)
            }
        }
    }

    pub fn handle_workflow(&mut self, request: WorkflowRequest, version: Version) -> Result<Reply> {
        let store = &mut self.store;
        match request {
            WorkflowRequest::Create => {
                let id = store.insert(Entity::Workflow(WorkflowNode::default()));
                object(store, id)
            }
            WorkflowRequest::AddOperators {
                workflow,
                operators,
            } => {
                workflow::add_operators(store, workflow, &operators)?;
                Ok(Reply::Unit)
            }
            WorkflowRequest::SetInputName {
                workflow,
                name,
                operator,
                pin,
            } => {
                workflow::set_input_name(store, workflow, name, operator, pin)?;
                Ok(Reply::Unit)
            }
            WorkflowRequest::SetOutputName {
                workflow,
                name,
                operator,
                pin,
            } => {
                workflow::set_output_name(store, workflow, name, operator, pin)?;
                Ok(Reply::Unit)
            }
            WorkflowRequest::ExposePin {
                workflow,
                operator,
                pin,
                direction,
            } => {
                workflow::expose_pin(store, workflow, operator, pin, direction)?;
                Ok(Reply::Unit)
            }
            WorkflowRequest::Connect {
                workflow,
                name,
                source,
            } => {
                workflow::connect(store, workflow, &name, source)?;
                Ok(Reply::Unit)
            }
            WorkflowRequest::Output { workflow, name } => Ok(Reply::Output(workflow::output(store, workflow, &name)?)),
            WorkflowRequest::Names { workflow } => {
                let node = store.workflow(workflow)?;
                Ok(Reply::WorkflowNames {
                    inputs: node.input_names(),
                    outputs: node.output_names(),
                })
            }
            WorkflowRequest::Chain { first, second, map } => {
                if version < features::WORKFLOW_CHAINING {
                    return Err(DpfError::version_mismatch(
                        "workflow chaining",
                        features::WORKFLOW_CHAINING,
                        version,
                    ));
                }
                let id = workflow::chain(store, first, second, &map)?;
                let node = store.workflow(id)?;
                WorkflowChained {
                    operators: node.operators().len(),
                    inputs: node.input_names().len(),
                    outputs: node.output_names().len(),
                }
                .log();
                object(store, id)
            }
            WorkflowRequest::Record {
                workflow,
                identifier,
            } => {
                store.workflow(workflow)?;
                store.add_ref(workflow)?;
                let previous = self.records.insert(identifier.clone(), workflow);
                if let Some(previous) = previous {
                    store.release(previous);
                }
                WorkflowRecorded {
                    identifier: &identifier,
                    replaced: previous.is_some(),
                }
                .log();
                Ok(Reply::Unit)
            }
            WorkflowRequest::Load { identifier } => {
                let recorded = *self.records.get(&identifier).ok_or_else(|| {
                    DpfError::invalid_argument(format!("no workflow recorded as '{identifier}'"))
                })?;
                let id = workflow::duplicate(store, recorded)?;
                object(store, id)
            }
        }
    }
}
