// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Consistency checks on a [`ServerConfig`] before it is used.
//!
//! Checks run in order and stop at the first problem:
//!
//! 1. **Endpoint**: a remote protocol needs a non-empty address and a
//!    non-zero port.
//! 2. **Container**: docker only makes sense with a gRPC protocol, and the
//!    container port must be non-zero.
//! 3. **Fuel**: the configured bounds must be ordered.

use crate::config::{Protocol, ServerConfig};
use crate::errors::ConfigError;

pub fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_endpoint(config)?;
    validate_docker(config)?;
    validate_fuel(config)
}

fn validate_endpoint(config: &ServerConfig) -> Result<(), ConfigError> {
    if !config.is_remote() {
        return Ok(());
    }
    if config.address.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "address",
            reason: format!("protocol {} needs an address", config.protocol),
        });
    }
    if config.port == 0 {
        return Err(ConfigError::Invalid {
            field: "port",
            reason: "port must be non-zero".to_string(),
        });
    }
    Ok(())
}

fn validate_docker(config: &ServerConfig) -> Result<(), ConfigError> {
    let Some(docker) = &config.docker else {
        return Ok(());
    };
    if config.protocol == Protocol::InProcess {
        return Err(ConfigError::Invalid {
            field: "docker",
            reason: "a containerized backend needs a gRPC protocol".to_string(),
        });
    }
    if docker.exposed_port == 0 {
        return Err(ConfigError::Invalid {
            field: "docker.exposed_port",
            reason: "container port must be non-zero".to_string(),
        });
    }
    if docker.image_name.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "docker.image_name",
            reason: "image name is empty".to_string(),
        });
    }
    Ok(())
}

fn validate_fuel(config: &ServerConfig) -> Result<(), ConfigError> {
    let fuel = &config.wasm.fuel;
    if fuel.get_minimum() > fuel.get_maximum() {
        return Err(ConfigError::Invalid {
            field: "wasm.fuel",
            reason: format!(
                "minimum {} is above maximum {}",
                fuel.get_minimum(),
                fuel.get_maximum()
            ),
        });
    }
    Ok(())
}
