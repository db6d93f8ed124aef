// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sandboxed execution of WASM plug-in exports.
//!
//! A plug-in is a core module exporting `memory`, `allocate(i32) -> i32`,
//! `deallocate(i32, i32)`, an initializer and one function per operator.
//! The initializer takes no argument and returns `(ptr << 32) | len` pointing
//! at UTF-8 `operator=export` lines. Each operator export has the signature
//! `(ptr: i32, count: i32) -> i32` and rewrites `count` little-endian f64
//! values in place, returning 0 on success.
//!
//! Every call runs in a fresh store with its own fuel budget, so a runaway
//! export traps instead of hanging the engine.

use crate::data::{Field, TypeSet, Value, ValueType};
use crate::errors::{DpfError, PluginError, PluginResult, Result};
use crate::observability::messages::plugin::ExecutionFailed;
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use std::sync::Arc;
use wasmtime::{Config, Engine, ExternType, Instance, Memory, Module, Store, TypedFunc};

const FIELD: TypeSet = TypeSet::single(ValueType::Field);
const F64_SIZE: usize = std::mem::size_of::<f64>();

/// A compiled plug-in module, shared by all operators it exports.
pub struct WasmPlugin {
    engine: Engine,
    module: Module,
    fuel: u64,
}

impl std::fmt::Debug for WasmPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmPlugin").field("fuel", &self.fuel).finish()
    }
}

struct Exports {
    memory: Memory,
    allocate: TypedFunc<i32, i32>,
    deallocate: TypedFunc<(i32, i32), ()>,
}

impl WasmPlugin {
    /// Compile `bytes` with fuel metering enabled.
    pub fn compile(bytes: &[u8], fuel: u64) -> PluginResult<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);
        let engine = Engine::new(&config).map_err(|e| PluginError::ModuleError(e.to_string()))?;
        let module =
            Module::new(&engine, bytes).map_err(|e| PluginError::ModuleError(e.to_string()))?;

        for required in ["allocate", "deallocate"] {
            if !matches!(module.get_export(required), Some(ExternType::Func(_))) {
                return Err(PluginError::MissingExport(required.to_string()));
            }
        }
        if !matches!(module.get_export("memory"), Some(ExternType::Memory(_))) {
            return Err(PluginError::MissingExport("memory".to_string()));
        }

        Ok(Self {
            engine,
            module,
            fuel,
        })
    }

    pub fn fuel(&self) -> u64 {
        self.fuel
    }

    fn instantiate(&self) -> PluginResult<(Store<()>, Instance)> {
        let mut store = Store::new(&self.engine, ());
        store.set_fuel(self.fuel)?;
        let instance = Instance::new(&mut store, &self.module, &[])?;
        Ok((store, instance))
    }

    fn exports(store: &mut Store<()>, instance: &Instance) -> PluginResult<Exports> {
        let memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or_else(|| PluginError::MissingExport("memory".to_string()))?;
        let allocate = instance
            .get_typed_func::<i32, i32>(&mut *store, "allocate")
            .map_err(|_| PluginError::MissingExport("allocate: (i32) -> i32".to_string()))?;
        let deallocate = instance
            .get_typed_func::<(i32, i32), ()>(&mut *store, "deallocate")
            .map_err(|_| PluginError::MissingExport("deallocate: (i32, i32) -> ()".to_string()))?;
        Ok(Exports {
            memory,
            allocate,
            deallocate,
        })
    }

    /// Run the initializer and parse the operator table it returns.
    pub fn manifest(&self, symbol: &str) -> PluginResult<Vec<(String, String)>> {
        let (mut store, instance) = self.instantiate()?;
        let init = instance
            .get_typed_func::<(), i64>(&mut store, symbol)
            .map_err(|_| PluginError::MissingExport(format!("{symbol}: () -> i64")))?;
        let packed = init.call(&mut store, ())? as u64;
        let ptr = (packed >> 32) as usize;
        let len = (packed & 0xffff_ffff) as usize;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| PluginError::MissingExport("memory".to_string()))?;
        let mut raw = vec![0u8; len];
        memory
            .read(&store, ptr, &mut raw)
            .map_err(|e| PluginError::MemoryError(format!("manifest at {ptr}+{len}: {e}")))?;
        let text = String::from_utf8(raw)
            .map_err(|e| PluginError::Manifest(format!("not UTF-8: {e}")))?;

        let entries = parse_manifest(&text)?;
        for (_, export) in &entries {
            if !matches!(self.module.get_export(export), Some(ExternType::Func(_))) {
                return Err(PluginError::MissingExport(export.clone()));
            }
        }
        Ok(entries)
    }

    /// Call `export` over `values`, rewriting them in place.
    pub fn call(&self, export: &str, values: &mut [f64]) -> PluginResult<()> {
        let (mut store, instance) = self.instantiate()?;
        let exports = Self::exports(&mut store, &instance)?;
        let func = instance
            .get_typed_func::<(i32, i32), i32>(&mut store, export)
            .map_err(|_| PluginError::MissingExport(format!("{export}: (i32, i32) -> i32")))?;

        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let size = i32::try_from(bytes.len())
            .map_err(|_| PluginError::MemoryError(format!("{} bytes exceed guest memory", bytes.len())))?;
        let count = values.len() as i32;

        let ptr = exports.allocate.call(&mut store, size)?;
        if ptr == 0 && size > 0 {
            return Err(PluginError::MemoryError("guest allocation failed".to_string()));
        }
        exports
            .memory
            .write(&mut store, ptr as usize, &bytes)
            .map_err(|e| PluginError::MemoryError(format!("write of {size} bytes: {e}")))?;

        let status = match func.call(&mut store, (ptr, count)) {
            Ok(status) => status,
            Err(e) => {
                let _ = exports.deallocate.call(&mut store, (ptr, size));
                return Err(e.into());
            }
        };
        if status != 0 {
            let _ = exports.deallocate.call(&mut store, (ptr, size));
            return Err(PluginError::ModuleError(format!(
                "export '{export}' returned status {status}"
            )));
        }

        let mut out = vec![0u8; bytes.len()];
        exports
            .memory
            .read(&store, ptr as usize, &mut out)
            .map_err(|e| PluginError::MemoryError(format!("read of {size} bytes: {e}")))?;
        exports.deallocate.call(&mut store, (ptr, size))?;

        for (value, chunk) in values.iter_mut().zip(out.chunks_exact(F64_SIZE)) {
            let mut le = [0u8; F64_SIZE];
            le.copy_from_slice(chunk);
            *value = f64::from_le_bytes(le);
        }
        Ok(())
    }
}

/// `operator=export` per line; blank lines are skipped.
pub fn parse_manifest(text: &str) -> PluginResult<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (name, export) = line
            .split_once('=')
            .ok_or_else(|| PluginError::Manifest(format!("expected 'operator=export', got '{line}'")))?;
        let (name, export) = (name.trim(), export.trim());
        if name.is_empty() || export.is_empty() {
            return Err(PluginError::Manifest(format!("empty name in '{line}'")));
        }
        if entries.iter().any(|(n, _): &(String, String)| n == name) {
            return Err(PluginError::DuplicateOperator(name.to_string()));
        }
        entries.push((name.to_string(), export.to_string()));
    }
    if entries.is_empty() {
        return Err(PluginError::Manifest("plug-in declares no operators".to_string()));
    }
    Ok(entries)
}

/// One operator backed by a plug-in export.
///
/// Takes a field on pin 0 and returns it with every value passed through
/// the export.
#[derive(Debug)]
pub struct WasmOperator {
    plugin: Arc<WasmPlugin>,
    plugin_name: String,
    export: String,
}

impl WasmOperator {
    pub fn new(plugin: Arc<WasmPlugin>, plugin_name: &str, export: &str) -> Self {
        Self {
            plugin,
            plugin_name: plugin_name.to_string(),
            export: export.to_string(),
        }
    }
}

impl OperatorImpl for WasmOperator {
    fn specification(&self) -> Specification {
        Specification::new("Transforms field values with a sandboxed plug-in export.")
            .input(0, PinSpec::required("field", FIELD, "field to transform"))
            .output(0, PinSpec::required("field", FIELD, "transformed field"))
            .category("plugin")
            .plugin(&self.plugin_name)
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        let mut field: Field = ctx.input_as::<Field>(0)?.clone();
        if let Err(error) = self.plugin.call(&self.export, field.data_mut()) {
            tracing::error!(
                "{}",
                ExecutionFailed {
                    export: &self.export,
                    error: &error,
                }
            );
            return Err(DpfError::evaluation_failed(ctx.name(), error.to_string()));
        }
        Ok(Outputs::from([(0, Value::Field(field))]))
    }
}
