// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

// The generated service lives in src/proto/dpf.v1.rs and is checked in, so a
// plain build needs no protoc. Set DPF_REGENERATE_PROTO=1 to rebuild it.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";

    println!("cargo:rerun-if-changed={proto_root}/dpf.proto");
    println!("cargo:rerun-if-env-changed=DPF_REGENERATE_PROTO");

    if std::env::var_os("DPF_REGENERATE_PROTO").is_none() {
        return Ok(());
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto") // generated Rust goes here
        .compile(&[format!("{proto_root}/dpf.proto")], &[proto_root])?;

    Ok(())
}
