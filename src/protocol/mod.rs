// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Transport-agnostic request and reply messages.
//!
//! Every backend call is one [`Request`] answered by one [`Reply`] or a
//! [`crate::errors::DpfError`]. The in-process C ABI and both gRPC wire
//! layouts carry exactly these values; only the framing differs.

mod blob;
mod codec;
mod specification;
mod version;

pub use blob::{decode_blob, encode_blob, BLOB_FORMAT_VERSION, BLOB_MAGIC};
pub use codec::WireLayout;
pub use specification::{ConfigOption, OperatorProperties, PinSpec, Specification};
pub use version::{features, Version};

use crate::data::{LabelSpace, Location, ObjectId, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Revision of the request/reply vocabulary below.
pub const PROTOCOL_VERSION: u32 = 1;

pub type SessionId = u64;

/// What a pin is connected to, as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PinSource {
    Value(Value),
    Object(ObjectId),
    Output { operator: ObjectId, pin: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Session(SessionRequest),
    Object(ObjectRequest),
    Operator(OperatorRequest),
    Workflow(WorkflowRequest),
    Data(DataRequest),
    File(FileRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionRequest {
    Open { client: String },
    Close,
    Info,
    LoadPlugin { path: String, symbol: String, alias: String },
    OperatorNames,
    MakeTmpDir,
    SetLogFile { path: Option<String> },
    Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectRequest {
    Create { value: Value },
    Fetch { id: ObjectId },
    Release { ids: Vec<ObjectId> },
    AddRef { id: ObjectId },
    Serialize { id: ObjectId },
    Deserialize {
        #[serde(with = "crate::data::bytes")]
        blob: Vec<u8>,
    },
    ByteSize { id: ObjectId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperatorRequest {
    Create { name: String },
    Specification { name: String },
    Connect { operator: ObjectId, pin: u32, source: PinSource },
    Disconnect { operator: ObjectId, pin: u32 },
    SetConfig { operator: ObjectId, name: String, value: Value },
    Config { operator: ObjectId },
    Output { operator: ObjectId, pin: u32 },
    Run { operator: ObjectId },
    Reset { operator: ObjectId },
    Stats { operator: ObjectId },
    /// New operator `name` wired and configured like `operator`.
    CloneWith { operator: ObjectId, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowRequest {
    Create,
    AddOperators { workflow: ObjectId, operators: Vec<ObjectId> },
    SetInputName { workflow: ObjectId, name: String, operator: ObjectId, pin: u32 },
    SetOutputName { workflow: ObjectId, name: String, operator: ObjectId, pin: u32 },
    ExposePin { workflow: ObjectId, operator: ObjectId, pin: u32, direction: PinDirection },
    Connect { workflow: ObjectId, name: String, source: PinSource },
    Output { workflow: ObjectId, name: String },
    Names { workflow: ObjectId },
    Chain { first: ObjectId, second: ObjectId, map: Vec<(String, String)> },
    Record { workflow: ObjectId, identifier: String },
    Load { identifier: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataRequest {
    Info { id: ObjectId },
    EntityData { id: ObjectId, index: usize },
    EntityDataById { id: ObjectId, entity_id: i32 },
    /// Slice of the flat buffer, in values (not bytes).
    ReadChunk { id: ObjectId, offset: usize, len: usize },
    CollectionQuery { id: ObjectId, partial: LabelSpace },
    CollectionEntry { id: ObjectId, label_space: LabelSpace },
    LabelScoping { id: ObjectId, label: String },
    ContainerProperty { id: ObjectId, name: String },
    ContainerTypes { id: ObjectId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileRequest {
    Upload {
        path: String,
        offset: u64,
        #[serde(with = "crate::data::bytes")]
        chunk: Vec<u8>,
    },
    Download { path: String, offset: u64, len: u64 },
    Delete { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub operator_count: usize,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub session: SessionId,
    pub version: Version,
    pub protocol_version: u32,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub value_type: ValueType,
}

/// An output is inlined when small, otherwise left on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputValue {
    Inline(Value),
    Object(ObjectInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorState {
    Unconfigured,
    Wired,
    Evaluating,
    Evaluated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub state: OperatorState,
    pub evaluations: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub live_objects: usize,
    pub operators: usize,
    pub workflows: usize,
    pub evaluations: u64,
}

/// Summary of a data object, enough to size reads without fetching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub value_type: ValueType,
    /// Entities for located data, entries for collections, properties for
    /// containers.
    pub len: usize,
    /// Length of the flat buffer, in values.
    pub data_len: usize,
    pub component_count: Option<usize>,
    pub location: Option<Location>,
    pub unit: Option<String>,
    pub name: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Unit,
    Session(ServerInfo),
    Names(Vec<String>),
    Path(String),
    Object(ObjectInfo),
    Objects(Vec<ObjectInfo>),
    Value(Value),
    Output(OutputValue),
    Specification(Specification),
    Config(BTreeMap<String, Value>),
    OperatorStats(OperatorStats),
    SessionStats(SessionStats),
    Info(DataInfo),
    Types(BTreeMap<String, ValueType>),
    WorkflowNames { inputs: Vec<String>, outputs: Vec<String> },
    Bytes(#[serde(with = "crate::data::bytes")] Vec<u8>),
    Chunk {
        #[serde(with = "crate::data::bytes")]
        bytes: Vec<u8>,
        eof: bool,
    },
    Size(u64),
}

impl Request {
    /// Short dotted name for logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Request::Session(r) => match r {
                SessionRequest::Open { .. } => "session.open",
                SessionRequest::Close => "session.close",
                SessionRequest::Info => "session.info",
                SessionRequest::LoadPlugin { .. } => "session.load_plugin",
                SessionRequest::OperatorNames => "session.operator_names",
                SessionRequest::MakeTmpDir => "session.make_tmp_dir",
                SessionRequest::SetLogFile { .. } => "session.set_log_file",
                SessionRequest::Stats => "session.stats",
            },
            Request::Object(r) => match r {
                ObjectRequest::Create { .. } => "object.create",
                ObjectRequest::Fetch { .. } => "object.fetch",
                ObjectRequest::Release { .. } => "object.release",
                ObjectRequest::AddRef { .. } => "object.add_ref",
                ObjectRequest::Serialize { .. } => "object.serialize",
                ObjectRequest::Deserialize { .. } => "object.deserialize",
                ObjectRequest::ByteSize { .. } => "object.byte_size",
            },
            Request::Operator(r) => match r {
                OperatorRequest::Create { .. } => "operator.create",
                OperatorRequest::Specification { .. } => "operator.specification",
                OperatorRequest::Connect { .. } => "operator.connect",
                OperatorRequest::Disconnect { .. } => "operator.disconnect",
                OperatorRequest::SetConfig { .. } => "operator.set_config",
                OperatorRequest::Config { .. } => "operator.config",
                OperatorRequest::Output { .. } => "operator.output",
                OperatorRequest::Run { .. } => "operator.run",
                OperatorRequest::Reset { .. } => "operator.reset",
                OperatorRequest::Stats { .. } => "operator.stats",
                OperatorRequest::CloneWith { .. } => "operator.clone_with",
            },
            Request::Workflow(r) => match r {
                WorkflowRequest::Create => "workflow.create",
                WorkflowRequest::AddOperators { .. } => "workflow.add_operators",
                WorkflowRequest::SetInputName { .. } => "workflow.set_input_name",
                WorkflowRequest::SetOutputName { .. } => "workflow.set_output_name",
                WorkflowRequest::ExposePin { .. } => "workflow.expose_pin",
                WorkflowRequest::Connect { .. } => "workflow.connect",
                WorkflowRequest::Output { .. } => "workflow.output",
                WorkflowRequest::Names { .. } => "workflow.names",
                WorkflowRequest::Chain { .. } => "workflow.chain",
                WorkflowRequest::Record { .. } => "workflow.record",
                WorkflowRequest::Load { .. } => "workflow.load",
            },
            Request::Data(r) => match r {
                DataRequest::Info { .. } => "data.info",
                DataRequest::EntityData { .. } => "data.entity_data",
                DataRequest::EntityDataById { .. } => "data.entity_data_by_id",
                DataRequest::ReadChunk { .. } => "data.read_chunk",
                DataRequest::CollectionQuery { .. } => "data.collection_query",
                DataRequest::CollectionEntry { .. } => "data.collection_entry",
                DataRequest::LabelScoping { .. } => "data.label_scoping",
                DataRequest::ContainerProperty { .. } => "data.container_property",
                DataRequest::ContainerTypes { .. } => "data.container_types",
            },
            Request::File(r) => match r {
                FileRequest::Upload { .. } => "file.upload",
                FileRequest::Download { .. } => "file.download",
                FileRequest::Delete { .. } => "file.delete",
            },
        }
    }
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Unit => "unit",
            Reply::Session(_) => "session",
            Reply::Names(_) => "names",
            Reply::Path(_) => "path",
            Reply::Object(_) => "object",
            Reply::Objects(_) => "objects",
            Reply::Value(_) => "value",
            Reply::Output(_) => "output",
            Reply::Specification(_) => "specification",
            Reply::Config(_) => "config",
            Reply::OperatorStats(_) => "operator_stats",
            Reply::SessionStats(_) => "session_stats",
            Reply::Info(_) => "info",
            Reply::Types(_) => "types",
            Reply::WorkflowNames { .. } => "workflow_names",
            Reply::Bytes(_) => "bytes",
            Reply::Chunk { .. } => "chunk",
            Reply::Size(_) => "size",
        }
    }
}

/// Unpack one reply variant, or fail with a transport error naming what came
/// back instead.
#[macro_export]
macro_rules! expect_reply {
    ($reply:expr, $pattern:pat => $out:expr) => {
        match $reply {
            $pattern => Ok($out),
            other => Err($crate::errors::DpfError::transport(format!(
                "unexpected '{}' reply from backend",
                other.kind()
            ))),
        }
    };
}
