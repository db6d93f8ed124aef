// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Containerized backends.
//!
//! A docker configuration turns `start` into `docker run` of the backend
//! image with its port published on a local one. Mounted volumes let the
//! client keep using host paths: every path sent to the backend is rewritten
//! to its in-container location first.

use crate::config::consts::{DEFAULT_CONTAINER_PORT, DEFAULT_DOCKER_IMAGE};
use crate::config::LicenseConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub image_name: String,
    /// Host path to container path.
    pub mounted_volumes: BTreeMap<String, String>,
    /// Extra arguments passed to `docker run` before the image name.
    pub extra_args: Vec<String>,
    /// Port the backend listens on inside the container.
    pub exposed_port: u16,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image_name: DEFAULT_DOCKER_IMAGE.to_string(),
            mounted_volumes: BTreeMap::new(),
            extra_args: Vec::new(),
            exposed_port: DEFAULT_CONTAINER_PORT,
        }
    }
}

impl DockerConfig {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            ..Self::default()
        }
    }

    pub fn mount(mut self, host: impl Into<String>, container: impl Into<String>) -> Self {
        self.mounted_volumes.insert(host.into(), container.into());
        self
    }

    /// Arguments of `docker run` publishing the backend on `local_port`.
    pub fn run_args(&self, local_port: u16, license: &LicenseConfig) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--rm".to_string(),
            "--publish".to_string(),
            format!("{local_port}:{}", self.exposed_port),
        ];
        for (key, value) in license.env() {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in &self.mounted_volumes {
            args.push("--volume".to_string());
            args.push(format!("{host}:{container}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.image_name.clone());
        args
    }

    /// Rewrite a host path to where the container sees it.
    ///
    /// The longest mounted host prefix wins; prefixes only match on whole
    /// path components. Paths outside every volume are returned unchanged.
    pub fn to_server_path(&self, local: &str) -> String {
        let best = self
            .mounted_volumes
            .iter()
            .filter(|(host, _)| covers(host, local))
            .max_by_key(|(host, _)| host.trim_end_matches(['/', '\\']).len());
        match best {
            Some((host, container)) => {
                let rest = &local[host.trim_end_matches(['/', '\\']).len()..];
                let rest = rest.trim_start_matches(['/', '\\']).replace('\\', "/");
                let container = container.trim_end_matches('/');
                if rest.is_empty() {
                    container.to_string()
                } else {
                    format!("{container}/{rest}")
                }
            }
            None => local.to_string(),
        }
    }
}

fn covers(host: &str, path: &str) -> bool {
    let host = host.trim_end_matches(['/', '\\']);
    match path.strip_prefix(host) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '\\']),
        None => false,
    }
}
