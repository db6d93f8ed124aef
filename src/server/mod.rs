// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Server handles: the only objects that talk to a backend.
//!
//! A [`Server`] owns one engine session reached through a
//! [`Backend`](crate::traits::Backend), in-process or over gRPC. Remote
//! objects keep a weak pointer back to it; once the server is shut down or
//! dropped every object of its session reports `stale-reference`.
//!
//! # Architecture Overview
//!
//! ```text
//! Server::start(config)
//!   ├─ in_process  InProcessBackend ─► ffi ─► Engine   (global or dedicated)
//!   ├─ grpc        launcher (process | docker) ─► GrpcBackend ─► dpf-server
//!   └─ connect     GrpcBackend to an already running dpf-server
//! ```
//!
//! Calls on one handle are issued one at a time. Releases of dropped
//! handles are queued and sent ahead of the next call.

pub mod grpc;
pub mod in_process;
pub mod launcher;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use grpc::GrpcBackend;
pub use in_process::InProcessBackend;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::{validate_config, Protocol, ServerConfig};
use crate::data::ObjectId;
use crate::errors::{DpfError, Result};
use crate::expect_reply;
use crate::observability::messages::server::{
    BackendStopFailed, CallTimedOut, ReleasesFlushed, ServerShutdown, ServerStarted,
};
use crate::observability::messages::StructuredLog;
use crate::protocol::{
    features, FileRequest, ObjectRequest, Reply, Request, ServerInfo, SessionRequest, SessionStats,
    Version, WireLayout,
};
use crate::traits::{Backend, Transport};
use launcher::Launched;

/// Bytes per upload or download round-trip.
pub const FILE_CHUNK_SIZE: u64 = 1 << 20;

static GLOBAL_IN_PROCESS: OnceLock<tokio::sync::Mutex<Weak<ServerInner>>> = OnceLock::new();

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct ServerInner {
    serial: u64,
    backend: Arc<dyn Backend>,
    info: ServerInfo,
    config: ServerConfig,
    deadline: Option<Duration>,
    pending: Mutex<Vec<ObjectId>>,
    closed: AtomicBool,
    in_flight: tokio::sync::Mutex<()>,
    launched: tokio::sync::Mutex<Option<Launched>>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let backend = self.backend.clone();
        let session = self.info.session;
        runtime.spawn(async move {
            let close = Request::Session(SessionRequest::Close);
            if let Err(err) = backend.call(session, close, None).await {
                tracing::debug!(session, error = %err, "closing a dropped session failed");
            }
        });
    }
}

/// Handle to one backend session. Cloning shares the session.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

/// Non-owning back-pointer held by remote objects.
#[derive(Clone)]
pub(crate) struct WeakServer {
    inner: Weak<ServerInner>,
}

impl WeakServer {
    pub fn upgrade(&self) -> Result<Server> {
        match self.inner.upgrade() {
            Some(inner) if !inner.closed.load(Ordering::SeqCst) => Ok(Server { inner }),
            _ => Err(DpfError::stale_reference("the server of this object was shut down")),
        }
    }

    pub fn is(&self, server: &Server) -> bool {
        Weak::ptr_eq(&self.inner, &Arc::downgrade(&server.inner))
    }

    /// Queue a release for the next call, if the server is still around.
    pub fn release_later(&self, id: ObjectId) {
        if let Some(inner) = self.inner.upgrade() {
            if !inner.closed.load(Ordering::SeqCst) {
                inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(id);
            }
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("transport", &self.transport().to_string())
            .field("endpoint", &self.endpoint())
            .field("session", &self.inner.info.session)
            .field("version", &self.inner.info.version)
            .finish()
    }
}

fn client_name() -> String {
    format!("dpf-client {}", env!("CARGO_PKG_VERSION"))
}

fn layout_of(protocol: Protocol) -> WireLayout {
    match protocol {
        Protocol::LegacyGrpc => WireLayout::Legacy,
        Protocol::Grpc | Protocol::InProcess => WireLayout::Current,
    }
}

impl Server {
    /// Start a backend as `config` describes.
    ///
    /// In-process: a global start returns the live global server if there
    /// is one; a dedicated start always creates a new engine. gRPC: spawns a
    /// `dpf-server` process, or a container when `docker` is set, and waits
    /// up to `start_timeout_ms` for it to answer.
    pub async fn start(config: ServerConfig) -> Result<Server> {
        validate_config(&config)?;
        match config.protocol {
            Protocol::InProcess => Self::start_in_process(config).await,
            Protocol::Grpc | Protocol::LegacyGrpc => Self::start_remote(config).await,
        }
    }

    /// Start with the default configuration adjusted by the environment.
    pub async fn start_default() -> Result<Server> {
        let mut config = ServerConfig::default();
        config.apply_env()?;
        Self::start(config).await
    }

    /// Connect to a backend already serving on `address:port`.
    pub async fn connect(address: &str, port: u16) -> Result<Server> {
        Self::connect_with(ServerConfig::grpc(address, port)).await
    }

    /// Connect using the endpoint, wire layout and timeouts of `config`.
    pub async fn connect_with(config: ServerConfig) -> Result<Server> {
        validate_config(&config)?;
        if !config.is_remote() {
            return Self::start_in_process(config).await;
        }
        let backend =
            GrpcBackend::connect(&config.address, config.port, layout_of(config.protocol)).await?;
        Self::with_backend(Arc::new(backend), config, None).await
    }

    async fn start_in_process(config: ServerConfig) -> Result<Server> {
        if !config.as_global {
            let backend = InProcessBackend::from_config(&config)?;
            return Self::with_backend(Arc::new(backend), config, None).await;
        }
        let global = GLOBAL_IN_PROCESS.get_or_init(|| tokio::sync::Mutex::new(Weak::new()));
        let mut slot = global.lock().await;
        if let Some(inner) = slot.upgrade() {
            if !inner.closed.load(Ordering::SeqCst) {
                return Ok(Server { inner });
            }
        }
        let backend = InProcessBackend::from_config(&config)?;
        let server = Self::with_backend(Arc::new(backend), config, None).await?;
        *slot = Arc::downgrade(&server.inner);
        Ok(server)
    }

    async fn start_remote(config: ServerConfig) -> Result<Server> {
        let launched = match &config.docker {
            Some(docker) => launcher::launch_container(&config, docker).await?,
            None => launcher::launch_process(&config)?,
        };
        let backend = GrpcBackend::connect_when_ready(
            &config.address,
            config.port,
            layout_of(config.protocol),
            Duration::from_millis(config.start_timeout_ms),
        )
        .await;
        let backend = match backend {
            Ok(backend) => backend,
            Err(err) => {
                let mut launched = launched;
                if let Err(error) = launched.stop().await {
                    BackendStopFailed {
                        backend: &launched.describe(),
                        error: &error,
                    }
                    .log();
                }
                return Err(err);
            }
        };
        Self::with_backend(Arc::new(backend), config, Some(launched)).await
    }

    /// Open a session on `backend`. The server owns `launched`, if any, and
    /// stops it on shutdown.
    pub(crate) async fn with_backend(
        backend: Arc<dyn Backend>,
        config: ServerConfig,
        launched: Option<Launched>,
    ) -> Result<Server> {
        let deadline = config.timeout_ms.map(Duration::from_millis);
        let open = Request::Session(SessionRequest::Open {
            client: client_name(),
        });
        let reply = backend.call(0, open, deadline).await?;
        let info = expect_reply!(reply, Reply::Session(info) => info)?;

        let transport = backend.transport().to_string();
        let endpoint = backend.endpoint();
        let version = info.version.to_string();
        ServerStarted {
            transport: &transport,
            endpoint: &endpoint,
            version: &version,
        }
        .log();

        Ok(Server {
            inner: Arc::new(ServerInner {
                serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
                backend,
                info,
                config,
                deadline,
                pending: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                in_flight: tokio::sync::Mutex::new(()),
                launched: tokio::sync::Mutex::new(launched),
            }),
        })
    }

    pub(crate) fn downgrade(&self) -> WeakServer {
        WeakServer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Process-unique number of this handle's session; clones share it.
    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    /// Whether both handles share one session.
    pub fn same_as(&self, other: &Server) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> &ServerInfo {
        &self.inner.info
    }

    pub fn version(&self) -> Version {
        self.inner.info.version
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> Transport {
        self.inner.backend.transport()
    }

    pub fn endpoint(&self) -> String {
        self.inner.backend.endpoint()
    }

    /// Whether the backend is at least `version` (`"major.minor"`).
    pub fn meet_version(&self, version: &str) -> bool {
        version
            .parse::<Version>()
            .map_or(false, |required| self.version() >= required)
    }

    /// Fail with `version-mismatch` unless the backend is at least `required`.
    pub fn require_version(&self, required: Version, feature: &str) -> Result<()> {
        if self.version() < required {
            return Err(DpfError::version_mismatch(feature, required, self.version()));
        }
        Ok(())
    }

    /// Rewrite a client path to the backend's view of it (docker volumes).
    pub fn to_server_path(&self, local: &str) -> String {
        match &self.inner.config.docker {
            Some(docker) => docker.to_server_path(local),
            None => local.to_string(),
        }
    }

    /// Send one request, after any queued releases.
    pub(crate) async fn call(&self, request: Request) -> Result<Reply> {
        if !self.is_alive() {
            return Err(DpfError::stale_reference("the server was shut down"));
        }
        let _turn = self.inner.in_flight.lock().await;
        self.flush_releases().await?;
        self.send(request).await
    }

    async fn send(&self, request: Request) -> Result<Reply> {
        let describe = request.describe();
        let result = self
            .inner
            .backend
            .call(self.inner.info.session, request, self.inner.deadline)
            .await;
        if let (Err(err), Some(deadline)) = (&result, self.inner.deadline) {
            if err.kind == crate::errors::ErrorKind::Timeout {
                CallTimedOut {
                    request: describe,
                    deadline,
                }
                .log();
            }
        }
        result
    }

    async fn flush_releases(&self) -> Result<()> {
        let ids: Vec<ObjectId> = std::mem::take(
            &mut *self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if ids.is_empty() {
            return Ok(());
        }
        let count = ids.len();
        match self.send(Request::Object(ObjectRequest::Release { ids: ids.clone() })).await {
            Ok(_) => {
                ReleasesFlushed { count }.log();
                Ok(())
            }
            Err(err) => {
                self.inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(ids);
                Err(err)
            }
        }
    }

    /// Send queued releases now instead of with the next call.
    pub async fn collect_garbage(&self) -> Result<()> {
        let _turn = self.inner.in_flight.lock().await;
        self.flush_releases().await
    }

    pub(crate) async fn session_request(&self, request: SessionRequest) -> Result<Reply> {
        self.call(Request::Session(request)).await
    }

    /// Close the session and stop the backend this handle launched.
    ///
    /// Shutting down twice is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _turn = self.inner.in_flight.lock().await;
        let live_objects = match self.send(Request::Session(SessionRequest::Stats)).await {
            Ok(Reply::SessionStats(stats)) => stats.live_objects,
            _ => 0,
        };
        let closed = self.send(Request::Session(SessionRequest::Close)).await;
        if let Some(mut launched) = self.inner.launched.lock().await.take() {
            launched.stop().await?;
        }
        let endpoint = self.endpoint();
        ServerShutdown {
            endpoint: &endpoint,
            live_objects,
        }
        .log();
        closed.map(|_| ())
    }

    pub async fn load_plugin(&self, path: &str, symbol: &str, alias: &str) -> Result<Vec<String>> {
        let reply = self
            .session_request(SessionRequest::LoadPlugin {
                path: self.to_server_path(path),
                symbol: symbol.to_string(),
                alias: alias.to_string(),
            })
            .await?;
        expect_reply!(reply, Reply::Names(names) => names)
    }

    pub async fn available_operator_names(&self) -> Result<Vec<String>> {
        let reply = self.session_request(SessionRequest::OperatorNames).await?;
        expect_reply!(reply, Reply::Names(names) => names)
    }

    /// A fresh directory on the backend host, removed when the session ends.
    pub async fn make_tmp_dir(&self) -> Result<String> {
        let reply = self.session_request(SessionRequest::MakeTmpDir).await?;
        expect_reply!(reply, Reply::Path(path) => path)
    }

    /// Tee the session's log to `path` on the backend host, or stop with `None`.
    pub async fn set_log_file(&self, path: Option<&str>) -> Result<()> {
        self.session_request(SessionRequest::SetLogFile {
            path: path.map(str::to_string),
        })
        .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        let reply = self.session_request(SessionRequest::Stats).await?;
        expect_reply!(reply, Reply::SessionStats(stats) => stats)
    }

    /// Copy a local file to `remote` on the backend host, in chunks.
    /// Returns the remote path.
    pub async fn upload_file(&self, local: &Path, remote: &str) -> Result<String> {
        self.require_version(features::FILE_TRANSFER, "file transfer")?;
        let mut file = tokio::fs::File::open(local)
            .await
            .map_err(|err| DpfError::io(format!("cannot open {}: {err}", local.display())))?;
        let mut offset = 0u64;
        let mut buffer = vec![0u8; FILE_CHUNK_SIZE as usize];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 && offset > 0 {
                break;
            }
            self.call(Request::File(FileRequest::Upload {
                path: remote.to_string(),
                offset,
                chunk: buffer[..read].to_vec(),
            }))
            .await?;
            offset += read as u64;
            if read == 0 {
                break;
            }
        }
        tracing::debug!(local = %local.display(), remote, bytes = offset, "file uploaded");
        Ok(remote.to_string())
    }

    /// Copy `remote` from the backend host to a local file, in chunks.
    /// Returns the number of bytes written.
    pub async fn download_file(&self, remote: &str, local: &Path) -> Result<u64> {
        self.require_version(features::FILE_TRANSFER, "file transfer")?;
        let mut file = tokio::fs::File::create(local)
            .await
            .map_err(|err| DpfError::io(format!("cannot create {}: {err}", local.display())))?;
        let mut offset = 0u64;
        loop {
            let reply = self
                .call(Request::File(FileRequest::Download {
                    path: remote.to_string(),
                    offset,
                    len: FILE_CHUNK_SIZE,
                }))
                .await?;
            let (bytes, eof) = expect_reply!(reply, Reply::Chunk { bytes, eof } => (bytes, eof))?;
            file.write_all(&bytes).await?;
            offset += bytes.len() as u64;
            if eof || bytes.is_empty() {
                break;
            }
        }
        file.flush().await?;
        tracing::debug!(remote, local = %local.display(), bytes = offset, "file downloaded");
        Ok(offset)
    }

    /// Delete a file on the backend host.
    pub async fn delete_file(&self, remote: &str) -> Result<()> {
        self.require_version(features::FILE_TRANSFER, "file transfer")?;
        self.call(Request::File(FileRequest::Delete {
            path: remote.to_string(),
        }))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[tokio::test]
    async fn test_global_start_is_idempotent() {
        let a = Server::start(ServerConfig::in_process()).await.unwrap();
        let b = Server::start(ServerConfig::in_process()).await.unwrap();
        assert!(a.same_as(&b));
        let dedicated = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        assert!(!dedicated.same_as(&a));
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_are_stale() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        server.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
        let err = server.available_operator_names().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::StaleReference);
    }

    #[tokio::test]
    async fn test_version_checks() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        assert!(server.meet_version("8.0"));
        assert!(!server.meet_version("99.1"));
        assert!(!server.meet_version("not a version"));
        let err = server
            .require_version(Version::new(42, 0), "time travel")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionMismatch);
    }

    #[tokio::test]
    async fn test_session_helpers() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        let names = server.available_operator_names().await.unwrap();
        assert!(names.iter().any(|n| n == "for_each"));
        let dir = server.make_tmp_dir().await.unwrap();
        assert!(Path::new(&dir).is_dir());
        assert_eq!(server.stats().await.unwrap().live_objects, 0);
        server.shutdown().await.unwrap();
        assert!(!Path::new(&dir).exists());
    }

    #[tokio::test]
    async fn test_file_round_trip_in_chunks() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("source.bin");
        let content: Vec<u8> = (0..(FILE_CHUNK_SIZE as usize * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&local, &content).unwrap();

        let remote = dir.path().join("remote").join("copy.bin");
        let remote = server
            .upload_file(&local, &remote.display().to_string())
            .await
            .unwrap();
        let back = dir.path().join("back.bin");
        let written = server.download_file(&remote, &back).await.unwrap();
        assert_eq!(written, content.len() as u64);
        assert_eq!(std::fs::read(&back).unwrap(), content);

        server.delete_file(&remote).await.unwrap();
        assert!(!Path::new(&remote).exists());
    }

    #[tokio::test]
    async fn test_empty_file_upload_creates_remote() {
        let server = Server::start(ServerConfig::in_process().dedicated()).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("empty");
        std::fs::write(&local, b"").unwrap();
        let remote = dir.path().join("empty-copy").display().to_string();
        server.upload_file(&local, &remote).await.unwrap();
        assert_eq!(std::fs::read(&remote).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_paths_unchanged_without_docker() {
        let config = ServerConfig::in_process().dedicated();
        let server = Server::start(config).await.unwrap();
        assert_eq!(server.to_server_path("/data/a.rst"), "/data/a.rst");
    }
}
