// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! WebAssembly operator plug-ins.
//!
//! Loading goes file -> size check -> encoding check -> compile -> manifest.
//! Any failure leaves nothing behind; the registry only sees the operator
//! list once every export has been resolved.

pub mod detector;
pub mod executor;
pub mod loader;

pub use detector::{is_wasm, validate_core_module};
pub use executor::{WasmOperator, WasmPlugin};

use crate::errors::PluginResult;
use crate::traits::OperatorImpl;
use std::path::Path;
use std::sync::Arc;

/// Load a plug-in file and build one operator per manifest entry.
///
/// `symbol` names the initializer export; `plugin_name` is recorded in each
/// operator's specification.
pub fn load_plugin(
    path: &Path,
    symbol: &str,
    plugin_name: &str,
    fuel: u64,
) -> PluginResult<Vec<(String, Arc<dyn OperatorImpl>)>> {
    let bytes = loader::read_module(path)?;
    load_plugin_bytes(&bytes, symbol, plugin_name, fuel)
}

pub fn load_plugin_bytes(
    bytes: &[u8],
    symbol: &str,
    plugin_name: &str,
    fuel: u64,
) -> PluginResult<Vec<(String, Arc<dyn OperatorImpl>)>> {
    validate_core_module(bytes)?;
    let plugin = Arc::new(WasmPlugin::compile(bytes, fuel)?);
    let operators = plugin
        .manifest(symbol)?
        .into_iter()
        .map(|(name, export)| {
            let op: Arc<dyn OperatorImpl> =
                Arc::new(WasmOperator::new(Arc::clone(&plugin), plugin_name, &export));
            (name, op)
        })
        .collect();
    Ok(operators)
}

/// Plug-in used by tests: `double` multiplies every value by two and `spin`
/// never returns.
#[cfg(test)]
pub(crate) const TEST_PLUGIN_WAT: &str = r#"
(module
  (memory (export "memory") 16)
  (global $next (mut i32) (i32.const 1024))
  (data (i32.const 16) "double=double_values\nspin=spin")

  (func (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))

  (func (export "deallocate") (param i32 i32))

  (func (export "dpf_plugin_init") (result i64)
    (i64.or (i64.shl (i64.const 16) (i64.const 32)) (i64.const 30)))

  (func (export "double_values") (param $ptr i32) (param $count i32) (result i32)
    (local $i i32)
    (local $addr i32)
    (block $done
      (loop $again
        (br_if $done (i32.ge_s (local.get $i) (local.get $count)))
        (local.set $addr (i32.add (local.get $ptr) (i32.shl (local.get $i) (i32.const 3))))
        (f64.store (local.get $addr) (f64.mul (f64.load (local.get $addr)) (f64.const 2)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $again)))
    (i32.const 0))

  (func (export "spin") (param i32 i32) (result i32)
    (loop $forever (br $forever))
    (i32.const 0))
)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PluginError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_plugin() -> Vec<u8> {
        wat::parse_str(TEST_PLUGIN_WAT).unwrap()
    }

    #[test]
    fn test_manifest_lists_operators() {
        let ops = load_plugin_bytes(&test_plugin(), "dpf_plugin_init", "demo", 1_000_000).unwrap();
        let names: Vec<&str> = ops.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["double", "spin"]);
        assert_eq!(ops[0].1.specification().properties.plugin, "demo");
    }

    #[test]
    fn test_call_rewrites_values() {
        let plugin = WasmPlugin::compile(&test_plugin(), 1_000_000).unwrap();
        let mut values = vec![1.5, -2.0, 4.0];
        plugin.call("double_values", &mut values).unwrap();
        assert_eq!(values, vec![3.0, -4.0, 8.0]);
    }

    #[test]
    fn test_runaway_export_runs_out_of_fuel() {
        let plugin = WasmPlugin::compile(&test_plugin(), 10_000).unwrap();
        let mut values = vec![1.0];
        let err = plugin.call("spin", &mut values).unwrap_err();
        assert!(matches!(err, PluginError::ExecutionError(_)));
    }

    #[test]
    fn test_missing_init_symbol() {
        let err = load_plugin_bytes(&test_plugin(), "no_such_init", "demo", 1_000_000).err().unwrap();
        assert!(matches!(err, PluginError::MissingExport(_)));
    }

    #[test]
    fn test_component_is_refused_before_compile() {
        let bytes = wat::parse_str("(component)").unwrap();
        let err = load_plugin_bytes(&bytes, "dpf_plugin_init", "demo", 1_000_000).err().unwrap();
        assert!(matches!(err, PluginError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&test_plugin()).unwrap();
        let ops = load_plugin(file.path(), "dpf_plugin_init", "demo", 1_000_000).unwrap();
        assert_eq!(ops.len(), 2);
    }
}
