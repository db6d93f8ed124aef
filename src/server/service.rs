// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The engine served over gRPC, as run by `dpf-server`.
//!
//! Each `Call` is decoded with the layout it names, handed to the engine on
//! the blocking pool and answered with the reply or a structured error. A
//! call that outlives its deadline is answered with `timeout`; the engine
//! finishes the work regardless.

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::{Request as GrpcRequest, Response, Status};

use crate::engine::Engine;
use crate::errors::{DpfError, Result};
use crate::observability::messages::server::{ServiceListening, ServiceStopped};
use crate::observability::messages::StructuredLog;
use crate::proto::call_reply::Outcome;
use crate::proto::data_processing_server::{DataProcessing, DataProcessingServer};
use crate::proto::{CallReply, CallRequest, ErrorDetail};
use crate::protocol::{Request, WireLayout};

pub struct EngineService {
    engine: Arc<Engine>,
}

impl EngineService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    async fn answer(&self, call: CallRequest) -> Result<Vec<u8>> {
        let layout = WireLayout::from(call.layout());
        let request: Request = layout.decode(&call.payload)?;
        let describe = request.describe();
        let engine = self.engine.clone();
        let session = call.session;
        let work = tokio::task::spawn_blocking(move || engine.handle(session, request));

        let joined = if call.deadline_ms > 0 {
            let deadline = Duration::from_millis(call.deadline_ms);
            tokio::time::timeout(deadline, work)
                .await
                .map_err(|_| DpfError::timeout(describe, deadline))?
        } else {
            work.await
        };
        let reply = joined.map_err(|err| DpfError::transport(format!("engine task failed: {err}")))??;
        layout.encode(&reply)
    }
}

#[tonic::async_trait]
impl DataProcessing for EngineService {
    async fn call(&self, request: GrpcRequest<CallRequest>) -> std::result::Result<Response<CallReply>, Status> {
        let call = request.into_inner();
        let correlation_id = call.correlation_id;
        let outcome = match self.answer(call).await {
            Ok(frame) => Outcome::Payload(frame),
            Err(err) => Outcome::Error(ErrorDetail::from(&err)),
        };
        Ok(Response::new(CallReply {
            correlation_id,
            outcome: Some(outcome),
        }))
    }
}

/// Serve `engine` on `address` until `shutdown` resolves.
pub async fn serve(
    engine: Arc<Engine>,
    address: SocketAddr,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let bound = address.to_string();
    let version = engine.version().to_string();
    ServiceListening {
        address: &bound,
        version: &version,
    }
    .log();
    tonic::transport::Server::builder()
        .add_service(DataProcessingServer::new(EngineService::new(engine)))
        .serve_with_shutdown(address, shutdown)
        .await?;
    ServiceStopped { address: &bound }.log();
    Ok(())
}

/// A service running on the current runtime.
pub struct ServiceHandle {
    pub address: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl ServiceHandle {
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| DpfError::transport(format!("service task failed: {err}")))?
    }
}

/// Start serving `engine` on a free loopback port.
pub async fn spawn_local(engine: Arc<Engine>) -> Result<ServiceHandle> {
    let port = free_port()?;
    let address: SocketAddr = ([127, 0, 0, 1], port).into();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move { serve(engine, address, token.cancelled_owned()).await });
    Ok(ServiceHandle {
        address,
        cancel,
        task,
    })
}

/// A loopback port nothing listens on right now.
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
