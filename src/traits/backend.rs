// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::errors::Result;
use crate::protocol::{Reply, Request, SessionId, WireLayout};

/// How a [`Backend`] reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    InProcess,
    Grpc(WireLayout),
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Transport::InProcess => f.write_str("in-process"),
            Transport::Grpc(WireLayout::Current) => f.write_str("grpc-current"),
            Transport::Grpc(WireLayout::Legacy) => f.write_str("grpc-legacy"),
        }
    }
}

/// One way of delivering requests to an engine session.
///
/// Everything above this trait is transport-agnostic: a backend only moves a
/// [`Request`] to the engine and brings the [`Reply`] or error back. The
/// `deadline` is advisory; the engine may keep computing after it passes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(
        &self,
        session: SessionId,
        request: Request,
        deadline: Option<Duration>,
    ) -> Result<Reply>;

    fn transport(&self) -> Transport;

    /// Library path or `address:port`.
    fn endpoint(&self) -> String;
}
