// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_ADDRESS, DEFAULT_FUEL_LEVEL, DEFAULT_PORT, DEFAULT_START_TIMEOUT_MS, MAX_FUEL_LEVEL,
    MIN_FUEL_LEVEL,
};
use crate::config::DockerConfig;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration used to start or connect to a backend server.
///
/// Loaded from a YAML or TOML file (chosen by extension) or built in code,
/// then adjusted by the environment through [`ServerConfig::apply_env`].
///
/// # Fields
/// * `protocol` - Transport to the backend (defaults to in-process)
/// * `ansys_path` - Installation root used to locate a backend executable
/// * `address` / `port` - Endpoint of a gRPC backend
/// * `docker` - Run the backend in a container instead of a local process
/// * `as_global` - Share one in-process backend per process
/// * `timeout_ms` - Deadline attached to every backend call (optional)
/// * `start_timeout_ms` - How long `start` waits for a launched backend
/// * `license` - License settings forwarded to launched backends
/// * `wasm` - Limits for WebAssembly plug-ins of in-process backends
///
/// # Example
/// ```yaml
/// protocol: grpc
/// address: 10.0.0.4
/// port: 50054
/// timeout_ms: 30000
/// docker:
///   image_name: ghcr.io/ansys/dpf-core:latest
///   mounted_volumes:
///     /home/me/results: /tmp/results
/// license:
///   accept_la: true
/// wasm:
///   fuel:
///     default: 100000000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub protocol: Protocol,
    pub ansys_path: Option<PathBuf>,
    pub address: String,
    pub port: u16,
    pub docker: Option<DockerConfig>,
    pub as_global: bool,
    pub timeout_ms: Option<u64>,
    pub start_timeout_ms: u64,
    pub license: LicenseConfig,
    pub wasm: WasmConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            ansys_path: None,
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            docker: None,
            as_global: true,
            timeout_ms: None,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            license: LicenseConfig::default(),
            wasm: WasmConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn in_process() -> Self {
        Self::default()
    }

    /// A gRPC configuration for `address:port`.
    pub fn grpc(address: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: Protocol::Grpc,
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// A dedicated server gets its own backend even in-process.
    pub fn dedicated(mut self) -> Self {
        self.as_global = false;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_docker(mut self, docker: DockerConfig) -> Self {
        self.docker = Some(docker);
        self
    }

    /// Whether this configuration reaches its backend over the network.
    pub fn is_remote(&self) -> bool {
        self.protocol != Protocol::InProcess
    }
}

/// Transport between a client and its backend.
///
/// Both gRPC variants expose the same behaviour; they differ only in how
/// requests are framed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    InProcess,
    Grpc,
    LegacyGrpc,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::InProcess => "in_process",
            Protocol::Grpc => "grpc",
            Protocol::LegacyGrpc => "legacy_grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the `DPF_SERVER_TYPE` spellings (`INPROCESS`, `GRPC`,
/// `LEGACYGRPC`) as well as the configuration file ones, ignoring case.
impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "inprocess" => Ok(Protocol::InProcess),
            "grpc" => Ok(Protocol::Grpc),
            "legacygrpc" => Ok(Protocol::LegacyGrpc),
            _ => Err(ConfigError::Invalid {
                field: "protocol",
                reason: format!("unknown server type '{s}'"),
            }),
        }
    }
}

/// License settings forwarded to launched backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Acceptance of the license agreement (`ANSYS_DPF_ACCEPT_LA`).
    pub accept_la: Option<bool>,
    /// License server location (`ANSYSLMD_LICENSE_FILE`).
    pub license_file: Option<String>,
}

impl LicenseConfig {
    /// `KEY=value` pairs to put in a launched backend's environment.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(accept) = self.accept_la {
            let flag = if accept { "Y" } else { "N" };
            vars.push(("ANSYS_DPF_ACCEPT_LA".to_string(), flag.to_string()));
        }
        if let Some(file) = &self.license_file {
            vars.push(("ANSYSLMD_LICENSE_FILE".to_string(), file.clone()));
        }
        vars
    }
}

/// WASM-specific configuration options.
///
/// # Example
/// ```yaml
/// wasm:
///   fuel:
///     default: 100000000
///     minimum: 1000000
///     maximum: 500000000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmConfig {
    #[serde(default)]
    pub fuel: FuelConfig,
}

/// Fuel given to each WebAssembly plug-in call.
///
/// Fuel bounds the number of instructions a plug-in operator may execute, so
/// a runaway export fails its evaluation instead of hanging the backend.
///
/// # Fields
/// * `default` - Fuel per call (defaults to 100M)
/// * `minimum` - Lower bound for a configured level (defaults to 1M)
/// * `maximum` - Upper bound for a configured level (defaults to 500M)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelConfig {
    pub default: Option<u64>,
    pub minimum: Option<u64>,
    pub maximum: Option<u64>,
}

impl FuelConfig {
    /// Get the default fuel level, using built-in default if not configured.
    pub fn get_default(&self) -> u64 {
        self.default.unwrap_or(DEFAULT_FUEL_LEVEL)
    }

    /// Get the minimum fuel level, using built-in default if not configured.
    pub fn get_minimum(&self) -> u64 {
        self.minimum.unwrap_or(MIN_FUEL_LEVEL)
    }

    /// Get the maximum fuel level, using built-in default if not configured.
    pub fn get_maximum(&self) -> u64 {
        self.maximum.unwrap_or(MAX_FUEL_LEVEL)
    }

    /// Clamp a fuel level to the configured bounds.
    ///
    /// # Example
    /// ```
    /// use dpf_client::config::FuelConfig;
    ///
    /// let config = FuelConfig::default();
    /// assert_eq!(config.validate_and_clamp(1_000_000_000), 500_000_000);
    /// ```
    pub fn validate_and_clamp(&self, requested: u64) -> u64 {
        let min = self.get_minimum();
        let max = self.get_maximum();
        if requested < min || requested > max {
            tracing::warn!(requested, min, max, "fuel level out of bounds, clamping");
        }
        requested.clamp(min, max)
    }

    /// The level each plug-in call actually gets.
    pub fn effective(&self) -> u64 {
        self.validate_and_clamp(self.get_default())
    }
}

/// Load a config from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "toml" => Ok(toml::from_str(&content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a config, apply the environment overrides, then validate it.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
    let mut cfg = load_config(path)?;
    cfg.apply_env()?;
    crate::config::validate_config(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_yaml_config() {
        let yaml = r#"
protocol: grpc
address: 10.0.0.4
port: 50100
timeout_ms: 2500
"#;
        let cfg: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.protocol, Protocol::Grpc);
        assert_eq!(cfg.address, "10.0.0.4");
        assert_eq!(cfg.port, 50100);
        assert_eq!(cfg.timeout_ms, Some(2500));
        assert!(cfg.as_global);
        assert!(cfg.docker.is_none());
    }

    #[test]
    fn test_defaults_are_in_process() {
        let cfg: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert!(!cfg.is_remote());
        assert_eq!(cfg.start_timeout_ms, DEFAULT_START_TIMEOUT_MS);
    }

    #[test]
    fn test_load_toml_by_extension() {
        let file = write_temp(
            ".toml",
            r#"
protocol = "legacy_grpc"
port = 50070

[docker]
image_name = "dpf:test"

[docker.mounted_volumes]
"/data" = "/mnt/data"
"#,
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.protocol, Protocol::LegacyGrpc);
        assert_eq!(cfg.port, 50070);
        let docker = cfg.docker.unwrap();
        assert_eq!(docker.image_name, "dpf:test");
        assert_eq!(docker.mounted_volumes.get("/data").map(String::as_str), Some("/mnt/data"));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = write_temp(".json", "{}");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "json"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_and_validate_rejects_docker_in_process() {
        let file = write_temp(
            ".yaml",
            r#"
protocol: in_process
docker:
  image_name: dpf:test
"#,
        );
        // A DPF_SERVER_TYPE in the test environment could flip the protocol.
        if std::env::var("DPF_SERVER_TYPE").is_err() {
            assert!(load_and_validate_config(file.path()).is_err());
        }
    }

    #[test]
    fn test_protocol_from_env_spellings() {
        assert_eq!("INPROCESS".parse::<Protocol>().unwrap(), Protocol::InProcess);
        assert_eq!("GRPC".parse::<Protocol>().unwrap(), Protocol::Grpc);
        assert_eq!("LEGACYGRPC".parse::<Protocol>().unwrap(), Protocol::LegacyGrpc);
        assert_eq!("legacy_grpc".parse::<Protocol>().unwrap(), Protocol::LegacyGrpc);
        assert!("carrier-pigeon".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_license_env_pairs() {
        let license = LicenseConfig {
            accept_la: Some(true),
            license_file: Some("1055@licserver".into()),
        };
        assert_eq!(
            license.env(),
            vec![
                ("ANSYS_DPF_ACCEPT_LA".to_string(), "Y".to_string()),
                ("ANSYSLMD_LICENSE_FILE".to_string(), "1055@licserver".to_string()),
            ]
        );
        assert!(LicenseConfig::default().env().is_empty());
    }

    #[test]
    fn test_wasm_config_defaults() {
        let cfg: ServerConfig = serde_yaml::from_str("protocol: in_process").unwrap();
        assert_eq!(cfg.wasm.fuel.get_default(), 100_000_000);
        assert_eq!(cfg.wasm.fuel.get_minimum(), 1_000_000);
        assert_eq!(cfg.wasm.fuel.get_maximum(), 500_000_000);
    }

    #[test]
    fn test_wasm_config_partial_override() {
        let yaml = r#"
wasm:
  fuel:
    default: 150000000
"#;
        let cfg: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.wasm.fuel.get_default(), 150_000_000);
        assert_eq!(cfg.wasm.fuel.get_maximum(), 500_000_000);
    }

    #[test]
    fn test_fuel_config_validate_and_clamp() {
        let config = FuelConfig {
            default: Some(100_000_000),
            minimum: Some(10_000_000),
            maximum: Some(200_000_000),
        };

        assert_eq!(config.validate_and_clamp(50_000_000), 50_000_000);
        assert_eq!(config.validate_and_clamp(1_000_000), 10_000_000);
        assert_eq!(config.validate_and_clamp(1_000_000_000), 200_000_000);
        assert_eq!(config.validate_and_clamp(200_000_000), 200_000_000);
    }

    #[test]
    fn test_effective_fuel_is_clamped_default() {
        let config = FuelConfig {
            default: Some(5),
            ..FuelConfig::default()
        };
        assert_eq!(config.effective(), MIN_FUEL_LEVEL);
    }
}
