// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

// Module declaration for generated protobuf code
#[path = "dpf.v1.rs"]
pub mod dpf_v1;

// Re-export the types for easier access
pub use dpf_v1::{
    call_reply, data_processing_client, data_processing_server, CallReply, CallRequest,
    ErrorDetail, WireLayout,
};
