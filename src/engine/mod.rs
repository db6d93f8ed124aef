// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The backend engine: sessions, object lifetimes and lazy graph evaluation.
//!
//! An [`Engine`] answers [`Request`]s for any number of client sessions. It
//! is what the in-process C ABI wraps and what `dpf-server` serves over
//! gRPC; both transports hand it exactly the same requests.
//!
//! # Architecture Overview
//!
//! ```text
//! Request ─► Engine::handle ─► Session (object store, records, tmp dirs, log tee)
//!                │                 ├─ graph     lazy post-order evaluation, caches
//!                │                 ├─ workflow  named boundaries, chaining, topology
//!                │                 └─ data      entity reads, chunks, queries
//!                ├─► OperatorRegistry (built-ins, plug-ins)
//!                └─► files (upload, download, delete)
//! ```
//!
//! Each session is guarded by its own lock, so calls on one session are
//! handled in issuance order while unrelated sessions proceed in parallel.

pub(crate) mod data;
pub(crate) mod files;
pub(crate) mod graph;
pub mod registry;
pub(crate) mod session;
pub(crate) mod store;
pub(crate) mod workflow;

#[cfg(test)]
mod integration_tests;

pub use graph::Binding;
pub use registry::OperatorRegistry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::consts::DEFAULT_FUEL_LEVEL;
use crate::errors::{DpfError, Result};
use crate::observability::messages::server::{RequestHandled, SessionClosed, SessionOpened};
use crate::observability::messages::StructuredLog;
use crate::protocol::{
    features, Capabilities, Reply, Request, ServerInfo, SessionId, SessionRequest, Version,
    PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use session::Session;

/// Backend version reported by engines built from this crate.
pub const ENGINE_VERSION: Version = Version::new(9, 0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Version reported to clients; gates features and built-ins.
    pub version: Version,
    /// Fuel given to each WASM plug-in call.
    pub fuel: u64,
    /// Parent of the directories `make_tmp_dir` creates.
    pub tmp_root: PathBuf,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            version: ENGINE_VERSION,
            fuel: DEFAULT_FUEL_LEVEL,
            tmp_root: std::env::temp_dir(),
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine {
    options: EngineOptions,
    registry: RwLock<OperatorRegistry>,
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<Session>>>>,
    next_session: AtomicU64,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let registry = OperatorRegistry::with_builtins(options.version, options.fuel);
        Self {
            options,
            registry: RwLock::new(registry),
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn version(&self) -> Version {
        self.options.version
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Objects alive across all sessions.
    pub fn live_objects(&self) -> usize {
        let sessions: Vec<_> = lock(&self.sessions).values().cloned().collect();
        sessions.iter().map(|s| lock(s).store.len()).sum()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Close every session, releasing all objects. Returns how many objects
    /// were still alive.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<SessionId> = lock(&self.sessions).keys().copied().collect();
        ids.into_iter().map(|id| self.close(id)).sum()
    }

    fn info(&self, session: SessionId) -> ServerInfo {
        let mut feature_names = vec!["deep_copy".to_string(), "plugins".to_string()];
        let version = self.options.version;
        for (name, required) in [
            ("file_transfer", features::FILE_TRANSFER),
            ("workflow_chaining", features::WORKFLOW_CHAINING),
            ("workflow_topology", features::WORKFLOW_TOPOLOGY),
        ] {
            if version >= required {
                feature_names.push(name.to_string());
            }
        }
        ServerInfo {
            session,
            version,
            protocol_version: PROTOCOL_VERSION,
            capabilities: Capabilities {
                operator_count: read(&self.registry).len(),
                features: feature_names,
            },
        }
    }

    fn open(&self, client: String) -> Reply {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        SessionOpened {
            session: id,
            client: &client,
        }
        .log();
        lock(&self.sessions).insert(id, Arc::new(Mutex::new(Session::new(id))));
        Reply::Session(self.info(id))
    }

    /// Closing an unknown or already closed session does nothing.
    fn close(&self, id: SessionId) -> usize {
        let Some(closed) = lock(&self.sessions).remove(&id) else {
            return 0;
        };
        let dropped = lock(&closed).close();
        SessionClosed {
            session: id,
            dropped_objects: dropped,
        }
        .log();
        dropped
    }

    fn session(&self, id: SessionId) -> Result<Arc<Mutex<Session>>> {
        lock(&self.sessions)
            .get(&id)
            .cloned()
            .ok_or_else(|| DpfError::stale_reference(format!("session {id}")))
    }

    fn require(&self, feature: &str, required: Version) -> Result<()> {
        if self.options.version < required {
            return Err(DpfError::version_mismatch(feature, required, self.options.version));
        }
        Ok(())
    }

    /// Answer one request on behalf of `session`.
    ///
    /// `Open` ignores `session` and creates a new one; every other request
    /// must name an open session.
    pub fn handle(&self, session: SessionId, request: Request) -> Result<Reply> {
        let started = Instant::now();
        let name = request.describe();

        let request = match request {
            Request::Session(SessionRequest::Open { client }) => return Ok(self.open(client)),
            Request::Session(SessionRequest::Close) => {
                self.close(session);
                return Ok(Reply::Unit);
            }
            other => other,
        };

        let handle = self.session(session)?;
        let mut state = lock(&handle);
        let result = self.dispatch(&mut state, request);

        let error = result.as_ref().err();
        let event = RequestHandled {
            session,
            request: name,
            error: error.map(|e| e as &dyn std::error::Error),
            duration: started.elapsed(),
        };
        event.log();
        state.tee(&event);
        result
    }

    fn dispatch(&self, session: &mut Session, request: Request) -> Result<Reply> {
        match request {
            Request::Session(request) => self.handle_session(session, request),
            Request::Object(request) => session.handle_object(request),
            Request::Operator(request) => session.handle_operator(request, &read(&self.registry)),
            Request::Workflow(request) => session.handle_workflow(request, self.options.version),
            Request::Data(request) => data::handle(&mut session.store, request),
            Request::File(request) => {
                self.require("file transfer", features::FILE_TRANSFER)?;
                files::handle(request)
            }
        }
    }

    fn handle_session(&self, session: &mut Session, request: SessionRequest) -> Result<Reply> {
        match request {
            SessionRequest::Info => Ok(Reply::Session(self.info(session.id()))),
            SessionRequest::LoadPlugin {
                path,
                symbol,
                alias,
            } => {
                let names = write(&self.registry).load_plugin(Path::new(&path), &symbol, &alias)?;
                Ok(Reply::Names(names))
            }
            SessionRequest::OperatorNames => Ok(Reply::Names(read(&self.registry).names())),
            SessionRequest::MakeTmpDir => {
                let dir = session.make_tmp_dir(&self.options.tmp_root)?;
                Ok(Reply::Path(dir.display().to_string()))
            }
            SessionRequest::SetLogFile { path } => {
                session.set_log_file(path.as_deref())?;
                Ok(Reply::Unit)
            }
            SessionRequest::Stats => Ok(Reply::SessionStats(session.stats())),
            SessionRequest::Open { .. } | SessionRequest::Close => {
                Err(DpfError::invalid_argument("session lifecycle requests are handled by the engine"))
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::protocol::{FileRequest, ObjectRequest, SessionStats};

    fn open(engine: &Engine) -> SessionId {
        match engine
            .handle(0, Request::Session(SessionRequest::Open { client: "test".into() }))
            .unwrap()
        {
            Reply::Session(info) => info.session,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_open_reports_version_and_features() {
        let engine = Engine::default();
        let reply = engine
            .handle(0, Request::Session(SessionRequest::Open { client: "t".into() }))
            .unwrap();
        let Reply::Session(info) = reply else { panic!() };
        assert_eq!(info.version, ENGINE_VERSION);
        assert_eq!(info.protocol_version, PROTOCOL_VERSION);
        assert!(info.capabilities.features.contains(&"workflow_topology".to_string()));
        assert!(info.capabilities.operator_count > 0);
    }

    #[test]
    fn test_unknown_session_is_stale() {
        let engine = Engine::default();
        let err = engine.handle(42, Request::Session(SessionRequest::Stats)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StaleReference);
    }

    #[test]
    fn test_close_drops_objects() {
        let engine = Engine::default();
        let s = open(&engine);
        engine
            .handle(s, Request::Object(ObjectRequest::Create { value: 3.0.into() }))
            .unwrap();
        assert_eq!(engine.live_objects(), 1);
        engine.handle(s, Request::Session(SessionRequest::Close)).unwrap();
        assert_eq!(engine.live_objects(), 0);
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_file_transfer_is_gated_by_version() {
        let engine = Engine::new(EngineOptions {
            version: Version::new(1, 0),
            ..EngineOptions::default()
        });
        let s = open(&engine);
        let err = engine
            .handle(s, Request::File(FileRequest::Delete { path: "x".into() }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionMismatch);
    }

    #[test]
    fn test_stats_start_empty() {
        let engine = Engine::default();
        let s = open(&engine);
        let reply = engine.handle(s, Request::Session(SessionRequest::Stats)).unwrap();
        assert_eq!(reply, Reply::SessionStats(SessionStats::default()));
    }

    #[test]
    fn test_tmp_dirs_are_removed_on_close() {
        let root = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineOptions {
            tmp_root: root.path().to_path_buf(),
            ..EngineOptions::default()
        });
        let s = open(&engine);
        let Reply::Path(dir) = engine.handle(s, Request::Session(SessionRequest::MakeTmpDir)).unwrap() else {
            panic!("expected a path");
        };
        assert!(Path::new(&dir).is_dir());
        engine.handle(s, Request::Session(SessionRequest::Close)).unwrap();
        assert!(!Path::new(&dir).exists());
    }

    #[test]
    fn test_log_tee_records_requests() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("session.log");
        let engine = Engine::default();
        let s = open(&engine);
        engine
            .handle(
                s,
                Request::Session(SessionRequest::SetLogFile {
                    path: Some(log.display().to_string()),
                }),
            )
            .unwrap();
        engine.handle(s, Request::Session(SessionRequest::Stats)).unwrap();
        let _ = engine.handle(s, Request::Object(ObjectRequest::AddRef { id: crate::data::ObjectId(99) }));
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("session.stats ok"));
        assert!(text.contains("object.add_ref failed"));
    }
}
