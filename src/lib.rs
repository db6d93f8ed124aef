// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;      // built-in operators and plug-in loaders
pub mod config;        // server configuration
pub mod data;          // typed data layer
pub mod engine;        // sessions, object store, lazy graph evaluation
pub mod errors;        // error handling
pub mod ffi;           // C entry points of the in-process backend
pub mod incremental;   // chunked evaluation
pub mod observability;
pub mod operator;      // client operators
pub mod proto;         // generated protobufs live here
pub mod protocol;      // transport-agnostic requests and replies
pub mod remote;        // remote object handles
pub mod server;        // server handles and transports
pub mod traits;        // unified abstractions
pub mod workflow;      // client workflows

pub use config::{Protocol, ServerConfig};
pub use data::{
    Collection, DataType, Field, GenericDataContainer, LabelSpace, Location, MeshedRegion,
    PropertyField, Scoping, StringField, TimeFreqSupport, Value, ValueType,
};
pub use errors::{DpfError, ErrorKind, Result};
pub use incremental::{split_workflow_in_chunks, ChunkedGraph, ChunkingOptions};
pub use operator::{Input, Operator};
pub use remote::{ObjectHandle, Remote};
pub use server::Server;
pub use workflow::{Workflow, WorkflowTopology};
