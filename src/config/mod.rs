// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod docker;
mod env;
mod loader;
mod validation;

pub mod consts;

pub use docker::DockerConfig;
pub use loader::{load_and_validate_config, load_config, FuelConfig, LicenseConfig, Protocol, ServerConfig, WasmConfig};
pub use validation::validate_config;
