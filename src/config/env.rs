// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Environment overrides read at start-up.

use crate::config::{Protocol, ServerConfig};
use crate::errors::ConfigError;
use std::path::PathBuf;

pub const SERVER_TYPE_VAR: &str = "DPF_SERVER_TYPE";
pub const ACCEPT_LA_VAR: &str = "ANSYS_DPF_ACCEPT_LA";
pub const LICENSE_FILE_VAR: &str = "ANSYSLMD_LICENSE_FILE";
pub const AWP_ROOT_PREFIX: &str = "AWP_ROOT";

impl ServerConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(std::env::vars())
    }

    /// Apply overrides from `vars`.
    ///
    /// - `DPF_SERVER_TYPE` replaces the protocol.
    /// - `ANSYS_DPF_ACCEPT_LA` (`Y`/`N`) and `ANSYSLMD_LICENSE_FILE` fill the
    ///   license settings.
    /// - `AWP_ROOT<version>` gives the installation root when none is set;
    ///   the highest version wins.
    pub fn apply_env_from<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut newest_root: Option<(u32, String)> = None;
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                SERVER_TYPE_VAR => {
                    self.protocol = value.parse::<Protocol>()?;
                    tracing::debug!(protocol = %self.protocol, "protocol set from environment");
                }
                ACCEPT_LA_VAR => {
                    self.license.accept_la = Some(parse_flag(value)?);
                }
                LICENSE_FILE_VAR => {
                    self.license.license_file = Some(value.to_string());
                }
                _ => {
                    let version = key
                        .strip_prefix(AWP_ROOT_PREFIX)
                        .and_then(|suffix| suffix.parse::<u32>().ok());
                    if let Some(version) = version {
                        if newest_root.as_ref().map_or(true, |(best, _)| version > *best) {
                            newest_root = Some((version, value.to_string()));
                        }
                    }
                }
            }
        }
        if self.ansys_path.is_none() {
            if let Some((version, root)) = newest_root {
                tracing::debug!(version, root = %root, "installation root from environment");
                self.ansys_path = Some(PathBuf::from(root));
            }
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "1" => Ok(true),
        "N" | "NO" | "FALSE" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field: "license.accept_la",
            reason: format!("{ACCEPT_LA_VAR} must be Y or N, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_type_overrides_protocol() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env_from([("DPF_SERVER_TYPE", "LEGACYGRPC")]).unwrap();
        assert_eq!(cfg.protocol, Protocol::LegacyGrpc);
    }

    #[test]
    fn test_bad_server_type_is_rejected() {
        let mut cfg = ServerConfig::default();
        assert!(cfg.apply_env_from([("DPF_SERVER_TYPE", "SMOKE_SIGNALS")]).is_err());
    }

    #[test]
    fn test_license_variables() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env_from([
            ("ANSYS_DPF_ACCEPT_LA", "Y"),
            ("ANSYSLMD_LICENSE_FILE", "1055@lic"),
        ])
        .unwrap();
        assert_eq!(cfg.license.accept_la, Some(true));
        assert_eq!(cfg.license.license_file.as_deref(), Some("1055@lic"));
        assert!(cfg.apply_env_from([("ANSYS_DPF_ACCEPT_LA", "maybe")]).is_err());
    }

    #[test]
    fn test_highest_awp_root_wins() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env_from([
            ("AWP_ROOT232", "/ansys/v232"),
            ("AWP_ROOT251", "/ansys/v251"),
            ("AWP_ROOT242", "/ansys/v242"),
            ("AWP_ROOTX", "/ignored"),
        ])
        .unwrap();
        assert_eq!(cfg.ansys_path, Some(PathBuf::from("/ansys/v251")));
    }

    #[test]
    fn test_explicit_ansys_path_is_kept() {
        let mut cfg = ServerConfig {
            ansys_path: Some(PathBuf::from("/opt/mine")),
            ..ServerConfig::default()
        };
        cfg.apply_env_from([("AWP_ROOT251", "/ansys/v251")]).unwrap();
        assert_eq!(cfg.ansys_path, Some(PathBuf::from("/opt/mine")));
    }
}
