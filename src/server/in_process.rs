// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServerConfig;
use crate::engine::EngineOptions;
use crate::errors::{DpfError, Result};
use crate::ffi::FfiEngine;
use crate::protocol::{Reply, Request, SessionId};
use crate::traits::{Backend, Transport};

/// An engine in the client's address space, driven through the C entry
/// points of [`crate::ffi`].
///
/// Calls run on the blocking pool so an evaluation never stalls the async
/// runtime.
pub struct InProcessBackend {
    engine: Arc<FfiEngine>,
}

impl InProcessBackend {
    pub fn new(options: &EngineOptions) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(FfiEngine::new(options)?),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(&engine_options(config))
    }
}

/// Engine options implied by a server configuration.
pub fn engine_options(config: &ServerConfig) -> EngineOptions {
    EngineOptions {
        fuel: config.wasm.fuel.effective(),
        ..EngineOptions::default()
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    async fn call(
        &self,
        session: SessionId,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<Reply> {
        let engine = self.engine.clone();
        let describe = request.describe();
        let work = tokio::task::spawn_blocking(move || engine.call(session, &request));
        let joined = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, work)
                .await
                .map_err(|_| DpfError::timeout(describe, deadline))?,
            None => work.await,
        };
        joined.map_err(|err| DpfError::transport(format!("in-process call failed: {err}")))?
    }

    fn transport(&self) -> Transport {
        Transport::InProcess
    }

    fn endpoint(&self) -> String {
        "in-process".to_string()
    }
}
