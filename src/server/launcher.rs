// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Spawning and tearing down backends for `start` with a gRPC protocol.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::{DockerConfig, ServerConfig};
use crate::errors::{DpfError, Result};
use crate::observability::messages::server::{BackendLaunched, BackendStopFailed};
use crate::observability::messages::StructuredLog;

/// Name of the backend executable.
pub const SERVER_PROGRAM: &str = "dpf-server";

/// A backend this client started and must stop.
#[derive(Debug)]
pub enum Launched {
    Process(Child),
    Container { id: String },
}

async fn stop_container(id: &str) -> Result<()> {
    let status = Command::new("docker")
        .args(["stop", id])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        return Err(DpfError::io(format!("docker stop {id} exited with {status}")));
    }
    Ok(())
}

impl Launched {
    pub fn describe(&self) -> String {
        match self {
            Launched::Process(child) => match child.id() {
                Some(pid) => format!("process {pid}"),
                None => "exited process".to_string(),
            },
            Launched::Container { id } => format!("container {id}"),
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        match self {
            Launched::Process(child) => {
                if child.try_wait()?.is_none() {
                    child.kill().await?;
                }
                Ok(())
            }
            Launched::Container { id } => {
                stop_container(id).await?;
                id.clear();
                Ok(())
            }
        }
    }
}

impl Drop for Launched {
    fn drop(&mut self) {
        // Processes are spawned with kill_on_drop; containers need a stop.
        let Launched::Container { id } = self else {
            return;
        };
        if id.is_empty() {
            return;
        }
        let id = std::mem::take(id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) = stop_container(&id).await {
                        BackendStopFailed {
                            backend: &format!("container {id}"),
                            error: &error,
                        }
                        .log();
                    }
                });
            }
            Err(_) => {
                let spawned = std::process::Command::new("docker")
                    .args(["stop", id.as_str()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
                if let Err(error) = spawned {
                    BackendStopFailed {
                        backend: &format!("container {id}"),
                        error: &DpfError::from(error),
                    }
                    .log();
                }
            }
        }
    }
}

/// Where to find the backend executable: under `ansys_path/bin` when an
/// installation root is known, otherwise on `PATH`.
pub fn server_program(config: &ServerConfig) -> PathBuf {
    match &config.ansys_path {
        Some(root) => root.join("bin").join(SERVER_PROGRAM),
        None => PathBuf::from(SERVER_PROGRAM),
    }
}

pub fn process_args(config: &ServerConfig) -> Vec<String> {
    vec![
        "--address".to_string(),
        config.address.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ]
}

/// Spawn a local backend process serving on `config.address:config.port`.
pub fn launch_process(config: &ServerConfig) -> Result<Launched> {
    let program = server_program(config);
    let child = Command::new(&program)
        .args(process_args(config))
        .envs(config.license.env())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| DpfError::io(format!("cannot launch {}: {err}", program.display())))?;
    let endpoint = format!("{}:{}", config.address, config.port);
    BackendLaunched {
        program: &program.display().to_string(),
        endpoint: &endpoint,
    }
    .log();
    Ok(Launched::Process(child))
}

/// `docker run` the backend image, publishing it on `config.port`.
pub async fn launch_container(config: &ServerConfig, docker: &DockerConfig) -> Result<Launched> {
    let output = Command::new("docker")
        .args(docker.run_args(config.port, &config.license))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| DpfError::io(format!("cannot run docker: {err}")))?;
    if !output.status.success() {
        return Err(DpfError::io(format!(
            "docker run {} failed: {}",
            docker.image_name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let endpoint = format!("{}:{}", config.address, config.port);
    BackendLaunched {
        program: &docker.image_name,
        endpoint: &endpoint,
    }
    .log();
    Ok(Launched::Container { id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_under_installation_root() {
        let mut config = ServerConfig::grpc("127.0.0.1", 50100);
        assert_eq!(server_program(&config), PathBuf::from("dpf-server"));
        config.ansys_path = Some(PathBuf::from("/opt/ansys/v251"));
        assert_eq!(
            server_program(&config),
            PathBuf::from("/opt/ansys/v251/bin/dpf-server")
        );
    }

    #[test]
    fn test_process_args() {
        let config = ServerConfig::grpc("0.0.0.0", 50100);
        assert_eq!(process_args(&config), vec!["--address", "0.0.0.0", "--port", "50100"]);
    }

    #[test]
    fn test_stopped_container_is_not_stopped_again() {
        let mut launched = Launched::Container { id: "f00d".to_string() };
        assert_eq!(launched.describe(), "container f00d");
        if let Launched::Container { id } = &mut launched {
            id.clear();
        }
        // Outside a runtime; with an empty id the drop must not shell out.
        drop(launched);
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let mut config = ServerConfig::grpc("127.0.0.1", 50100);
        config.ansys_path = Some(PathBuf::from("/definitely/not/installed"));
        let err = launch_process(&config).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Io);
    }
}
