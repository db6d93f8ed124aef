// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client side of the gRPC transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::errors::{DpfError, Result};
use crate::proto::call_reply::Outcome;
use crate::proto::data_processing_client::DataProcessingClient;
use crate::proto::{self, CallRequest};
use crate::protocol::{Reply, Request, SessionId, WireLayout};
use crate::traits::{Backend, Transport};

/// A connection to a `dpf-server` (or any service speaking `dpf.v1`).
pub struct GrpcBackend {
    client: DataProcessingClient<Channel>,
    layout: WireLayout,
    endpoint: String,
    correlation: AtomicU64,
}

impl GrpcBackend {
    pub async fn connect(address: &str, port: u16, layout: WireLayout) -> Result<Self> {
        let endpoint = format!("{address}:{port}");
        let channel = Endpoint::from_shared(format!("http://{endpoint}"))
            .map_err(|err| DpfError::transport(format!("invalid endpoint {endpoint}: {err}")))?
            .connect()
            .await?;
        Ok(Self {
            client: DataProcessingClient::new(channel),
            layout,
            endpoint,
            correlation: AtomicU64::new(1),
        })
    }

    /// Retry [`GrpcBackend::connect`] until the backend answers or `timeout`
    /// passes. Used right after launching a backend.
    pub async fn connect_when_ready(
        address: &str,
        port: u16,
        layout: WireLayout,
        timeout: Duration,
    ) -> Result<Self> {
        let started = Instant::now();
        loop {
            match Self::connect(address, port, layout).await {
                Ok(backend) => return Ok(backend),
                Err(err) if started.elapsed() >= timeout => {
                    tracing::debug!(error = %err, "backend never became ready");
                    return Err(DpfError::timeout(format!("backend at {address}:{port}"), timeout));
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    }

    pub fn layout(&self) -> WireLayout {
        self.layout
    }
}

#[async_trait]
impl Backend for GrpcBackend {
    async fn call(
        &self,
        session: SessionId,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<Reply> {
        let correlation_id = self.correlation.fetch_add(1, Ordering::Relaxed);
        let message = CallRequest {
            session,
            layout: proto::WireLayout::from(self.layout) as i32,
            payload: self.layout.encode(&request)?,
            deadline_ms: deadline.map_or(0, |d| d.as_millis() as u64),
            correlation_id,
        };
        let mut call = tonic::Request::new(message);
        if let Some(deadline) = deadline {
            call.set_timeout(deadline);
        }

        let mut client = self.client.clone();
        let response = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, client.call(call))
                .await
                .map_err(|_| DpfError::timeout(request.describe(), deadline))??,
            None => client.call(call).await?,
        };
        let reply = response.into_inner();
        if reply.correlation_id != correlation_id {
            return Err(DpfError::transport(format!(
                "reply {} does not answer call {correlation_id}",
                reply.correlation_id
            )));
        }
        match reply.outcome {
            Some(Outcome::Payload(frame)) => self.layout.decode(&frame),
            Some(Outcome::Error(detail)) => Err(detail.into()),
            None => Err(DpfError::transport("reply carries neither payload nor error")),
        }
    }

    fn transport(&self) -> Transport {
        Transport::Grpc(self.layout)
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let port = crate::server::service::free_port().unwrap();
        let err = GrpcBackend::connect("127.0.0.1", port, WireLayout::Current)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_ready_wait_times_out() {
        let port = crate::server::service::free_port().unwrap();
        let err = GrpcBackend::connect_when_ready(
            "127.0.0.1",
            port,
            WireLayout::Legacy,
            Duration::from_millis(250),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
