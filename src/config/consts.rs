// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default fuel level for WASM plug-in calls (100 million instructions)
pub const DEFAULT_FUEL_LEVEL: u64 = 100_000_000;
/// Minimum allowed fuel level (1 million instructions)
pub const MIN_FUEL_LEVEL: u64 = 1_000_000;
/// Maximum allowed fuel level (500 million instructions)
pub const MAX_FUEL_LEVEL: u64 = 500_000_000;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50054;
/// How long `start` waits for a launched backend to accept connections.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 20_000;

pub const DEFAULT_DOCKER_IMAGE: &str = "ghcr.io/ansys/dpf-core:latest";
/// Port the backend listens on inside its container.
pub const DEFAULT_CONTAINER_PORT: u16 = 50052;
