// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! `dpf-server`: the engine served over gRPC.
//!
//! ```text
//! dpf-server [--address <host>] [--port <port>] [--config <file>] [--log-level <filter>]
//! ```
//!
//! Without `--config` the server listens on the default address and port.
//! A config file (YAML or TOML) supplies address, port and plug-in fuel;
//! flags given on the command line win over it.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use dpf_client::config::{consts, load_and_validate_config, ServerConfig};
use dpf_client::engine::Engine;
use dpf_client::server::in_process::engine_options;
use dpf_client::server::service::serve;

#[derive(Debug, Default)]
struct Args {
    address: Option<String>,
    port: Option<u16>,
    config: Option<PathBuf>,
    log_level: Option<String>,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--address <host>] [--port <port>] [--config <file>] [--log-level <filter>]\n\
         Defaults: --address {} --port {}",
        consts::DEFAULT_ADDRESS,
        consts::DEFAULT_PORT
    )
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("{flag} needs a value"))
        };
        match flag.as_str() {
            "--address" => parsed.address = Some(value()?),
            "--port" => {
                let port = value()?;
                parsed.port = Some(port.parse().with_context(|| format!("invalid port '{port}'"))?);
            }
            "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "--log-level" => parsed.log_level = Some(value()?),
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(parsed)
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "dpf-server".to_string());
    if env::args().any(|a| a == "--help" || a == "-h") {
        println!("{}", usage(&program));
        return Ok(());
    }
    let args = match parse_args(argv) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err:#}\n{}", usage(&program));
            std::process::exit(2);
        }
    };
    init_tracing(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let endpoint = format!("{}:{}", config.address, config.port);
    let address = tokio::net::lookup_host(&endpoint)
        .await
        .with_context(|| format!("cannot resolve {endpoint}"))?
        .next()
        .with_context(|| format!("{endpoint} resolves to nothing"))?;

    let engine = Arc::new(Engine::new(engine_options(&config)));
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
        }
    };
    serve(engine.clone(), address, shutdown).await?;

    let released = engine.shutdown();
    tracing::info!(released, "sessions closed");
    Ok(())
}
