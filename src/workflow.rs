// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client workflows: operator graphs behind named inputs and outputs.
//!
//! One external input name may fan out to several internal pins; each
//! external output name maps to exactly one operator output. Two workflows
//! chain by feeding named outputs of the first into named inputs of the
//! second.

use std::fmt;

use crate::data::{Collection, DataType, GenericDataContainer, ObjectId, Value};
use crate::errors::{DpfError, Result};
use crate::expect_reply;
use crate::operator::{Input, Operator};
use crate::protocol::{features, PinDirection, Reply, Request, WorkflowRequest};
use crate::remote::{adopt_output, resolve_output, ObjectHandle, Remote};
use crate::server::Server;

/// A backend workflow.
pub struct Workflow {
    handle: ObjectHandle,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Workflow").field(&self.handle.id()).finish()
    }
}

impl Workflow {
    pub async fn new(server: &Server) -> Result<Self> {
        let reply = server.call(Request::Workflow(WorkflowRequest::Create)).await?;
        Self::adopt(server, reply)
    }

    fn adopt(server: &Server, reply: Reply) -> Result<Self> {
        let info = expect_reply!(reply, Reply::Object(info) => info)?;
        Ok(Self {
            handle: ObjectHandle::adopt(server, info),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn server(&self) -> Result<Server> {
        self.handle.server()
    }

    async fn request(&self, request: WorkflowRequest) -> Result<Reply> {
        self.server()?.call(Request::Workflow(request)).await
    }

    fn member(&self, operator: &Operator) -> Result<ObjectId> {
        let server = self.server()?;
        operator.handle().ensure_on(&server)?;
        Ok(operator.id())
    }

    pub async fn add_operator(&self, operator: &Operator) -> Result<()> {
        self.add_operators(&[operator]).await
    }

    pub async fn add_operators(&self, operators: &[&Operator]) -> Result<()> {
        let operators = operators
            .iter()
            .map(|op| self.member(op))
            .collect::<Result<Vec<_>>>()?;
        self.request(WorkflowRequest::AddOperators {
            workflow: self.id(),
            operators,
        })
        .await?;
        Ok(())
    }

    /// Alias input `pin` of `operator` as `name`. Repeating a name fans the
    /// input out to every aliased pin.
    pub async fn set_input_name(&self, name: &str, operator: &Operator, pin: u32) -> Result<()> {
        let operator = self.member(operator)?;
        self.request(WorkflowRequest::SetInputName {
            workflow: self.id(),
            name: name.to_string(),
            operator,
            pin,
        })
        .await?;
        Ok(())
    }

    /// Publish output `pin` of `operator` as `name`; names are unique.
    pub async fn set_output_name(&self, name: &str, operator: &Operator, pin: u32) -> Result<()> {
        let operator = self.member(operator)?;
        self.request(WorkflowRequest::SetOutputName {
            workflow: self.id(),
            name: name.to_string(),
            operator,
            pin,
        })
        .await?;
        Ok(())
    }

    /// List an internal pin in the topology without naming it.
    pub async fn expose_pin(&self, operator: &Operator, pin: u32, direction: PinDirection) -> Result<()> {
        let operator = self.member(operator)?;
        self.request(WorkflowRequest::ExposePin {
            workflow: self.id(),
            operator,
            pin,
            direction,
        })
        .await?;
        Ok(())
    }

    /// Bind external input `name` on every pin it aliases.
    pub async fn connect<'a>(&self, name: &str, input: impl Into<Input<'a>>) -> Result<()> {
        let server = self.server()?;
        let source = input.into().into_source(&server)?;
        server
            .call(Request::Workflow(WorkflowRequest::Connect {
                workflow: self.id(),
                name: name.to_string(),
                source,
            }))
            .await?;
        Ok(())
    }

    async fn raw_output(&self, name: &str) -> Result<crate::protocol::OutputValue> {
        let reply = self
            .request(WorkflowRequest::Output {
                workflow: self.id(),
                name: name.to_string(),
            })
            .await?;
        expect_reply!(reply, Reply::Output(output) => output)
    }

    pub async fn get_output_value(&self, name: &str) -> Result<Value> {
        let output = self.raw_output(name).await?;
        resolve_output(&self.server()?, output).await
    }

    /// Evaluate the part of the graph behind output `name`.
    pub async fn get_output<T: DataType>(&self, name: &str) -> Result<T> {
        self.get_output_value(name).await?.cast()
    }

    pub async fn get_output_remote<T: DataType>(&self, name: &str) -> Result<Remote<T>> {
        let output = self.raw_output(name).await?;
        Remote::from_handle(adopt_output(&self.server()?, output).await?)
    }

    async fn names(&self) -> Result<(Vec<String>, Vec<String>)> {
        let reply = self
            .request(WorkflowRequest::Names { workflow: self.id() })
            .await?;
        expect_reply!(reply, Reply::WorkflowNames { inputs, outputs } => (inputs, outputs))
    }

    pub async fn input_names(&self) -> Result<Vec<String>> {
        Ok(self.names().await?.0)
    }

    pub async fn output_names(&self) -> Result<Vec<String>> {
        Ok(self.names().await?.1)
    }

    /// A new workflow where each `(output, input)` pair of `map` feeds
    /// output `output` of `self` into input `input` of `next`.
    pub async fn connect_with(&self, next: &Workflow, map: &[(&str, &str)]) -> Result<Workflow> {
        let server = self.server()?;
        server.require_version(features::WORKFLOW_CHAINING, "workflow chaining")?;
        next.handle.ensure_on(&server)?;
        let reply = server
            .call(Request::Workflow(WorkflowRequest::Chain {
                first: self.id(),
                second: next.id(),
                map: map
                    .iter()
                    .map(|(output, input)| (output.to_string(), input.to_string()))
                    .collect(),
            }))
            .await?;
        Self::adopt(&server, reply)
    }

    /// Keep this workflow in the session under `identifier`.
    pub async fn record(&self, identifier: &str) -> Result<()> {
        self.request(WorkflowRequest::Record {
            workflow: self.id(),
            identifier: identifier.to_string(),
        })
        .await?;
        Ok(())
    }

    /// A fresh copy of the workflow recorded under `identifier`.
    pub async fn load(server: &Server, identifier: &str) -> Result<Workflow> {
        let reply = server
            .call(Request::Workflow(WorkflowRequest::Load {
                identifier: identifier.to_string(),
            }))
            .await?;
        Self::adopt(server, reply)
    }

    /// Ask the backend for the graph behind this workflow.
    pub async fn topology(&self) -> Result<WorkflowTopology> {
        let server = self.server()?;
        server.require_version(features::WORKFLOW_TOPOLOGY, "workflow topology")?;
        let op = Operator::new(&server, "workflow_topology").await?;
        op.connect(0, &self.handle).await?;
        let container: GenericDataContainer = op.get_output(0).await?;
        WorkflowTopology::from_container(&container)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyOperator {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConnection {
    pub source_operator: u64,
    pub source_pin: u32,
    pub target_operator: u64,
    pub target_pin: u32,
}

/// A pin fed by data rather than by an operator of the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConnection {
    pub data_type: String,
    pub target_operator: u64,
    pub target_pin: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPin {
    pub name: String,
    pub operator: u64,
    pub pin: u32,
}

/// Typed reading of the `workflow_topology` operator's container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowTopology {
    pub operators: Vec<TopologyOperator>,
    pub operator_connections: Vec<OperatorConnection>,
    pub data_connections: Vec<DataConnection>,
    pub exposed_inputs: Vec<ExposedPin>,
    pub exposed_outputs: Vec<ExposedPin>,
}

fn entries<T>(
    container: &GenericDataContainer,
    property: &str,
    read: impl Fn(&GenericDataContainer) -> Result<T>,
) -> Result<Vec<T>> {
    container
        .get_property_as::<Collection<GenericDataContainer>>(property)?
        .iter()
        .map(|(_, entry)| read(entry))
        .collect()
}

fn id(entry: &GenericDataContainer, name: &str) -> Result<u64> {
    let value = entry.get_property_as::<i64>(name)?;
    u64::try_from(value).map_err(|_| DpfError::transport(format!("negative {name} {value}")))
}

fn pin(entry: &GenericDataContainer, name: &str) -> Result<u32> {
    let value = entry.get_property_as::<i64>(name)?;
    u32::try_from(value).map_err(|_| DpfError::transport(format!("{name} {value} out of range")))
}

fn exposed(entry: &GenericDataContainer) -> Result<ExposedPin> {
    Ok(ExposedPin {
        name: entry.get_property_as::<String>("name")?,
        operator: id(entry, "operator_id")?,
        pin: pin(entry, "pin")?,
    })
}

impl WorkflowTopology {
    pub fn from_container(container: &GenericDataContainer) -> Result<Self> {
        Ok(Self {
            operators: entries(container, "operators", |e| {
                Ok(TopologyOperator {
                    id: id(e, "id")?,
                    name: e.get_property_as::<String>("name")?,
                })
            })?,
            operator_connections: entries(container, "operator_connections", |e| {
                Ok(OperatorConnection {
                    source_operator: id(e, "source_operator")?,
                    source_pin: pin(e, "source_pin")?,
                    target_operator: id(e, "target_operator")?,
                    target_pin: pin(e, "target_pin")?,
                })
            })?,
            data_connections: entries(container, "data_connections", |e| {
                Ok(DataConnection {
                    data_type: e.get_property_as::<String>("data_type")?,
                    target_operator: id(e, "target_operator")?,
                    target_pin: pin(e, "target_pin")?,
                })
            })?,
            exposed_inputs: entries(container, "exposed_inputs", exposed)?,
            exposed_outputs: entries(container, "exposed_outputs", exposed)?,
        })
    }
}
