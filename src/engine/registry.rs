// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operator implementations known to an engine, by registered name.
//!
//! Built-ins are registered under their plain names. Plug-in operators are
//! registered as `alias::name`, all or nothing: a plug-in whose names clash
//! with existing ones registers none of them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::backends::local::LocalOperatorFactory;
use crate::backends::{native, wasm};
use crate::errors::{DpfError, PluginError, PluginResult, Result};
use crate::observability::messages::plugin::{PluginLoadFailed, PluginLoaded};
use crate::observability::messages::StructuredLog;
use crate::protocol::{Specification, Version};
use crate::traits::OperatorImpl;

struct Registered {
    implementation: Arc<dyn OperatorImpl>,
    spec: Arc<Specification>,
}

pub struct OperatorRegistry {
    operators: BTreeMap<String, Registered>,
    fuel: u64,
}

impl OperatorRegistry {
    /// Empty registry; plug-in WASM exports run with `fuel` per call.
    pub fn new(fuel: u64) -> Self {
        Self {
            operators: BTreeMap::new(),
            fuel,
        }
    }

    /// Registry holding the built-ins available at `version`.
    pub fn with_builtins(version: Version, fuel: u64) -> Self {
        let mut registry = Self::new(fuel);
        for (name, implementation) in LocalOperatorFactory::builtins(version) {
            registry.insert(name.to_string(), implementation);
        }
        registry
    }

    fn insert(&mut self, name: String, implementation: Arc<dyn OperatorImpl>) {
        let spec = Arc::new(implementation.specification());
        self.operators.insert(
            name,
            Registered {
                implementation,
                spec,
            },
        );
    }

    pub fn register(&mut self, name: &str, implementation: Arc<dyn OperatorImpl>) -> PluginResult<()> {
        if self.operators.contains_key(name) {
            return Err(PluginError::DuplicateOperator(name.to_string()));
        }
        self.insert(name.to_string(), implementation);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<(Arc<dyn OperatorImpl>, Arc<Specification>)> {
        self.operators
            .get(name)
            .map(|r| (Arc::clone(&r.implementation), Arc::clone(&r.spec)))
            .ok_or_else(|| DpfError::unknown_operator(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.operators.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Load a WASM or native plug-in and register its operators under
    /// `alias`. Returns the names that were added.
    pub fn load_plugin(&mut self, path: &Path, symbol: &str, alias: &str) -> Result<Vec<String>> {
        let path_str = path.display().to_string();
        match self.try_load_plugin(path, symbol, alias) {
            Ok((kind, names)) => {
                PluginLoaded {
                    path: &path_str,
                    alias,
                    kind,
                    operator_count: names.len(),
                }
                .log();
                Ok(names)
            }
            Err(error) => {
                PluginLoadFailed {
                    path: &path_str,
                    error: &error,
                }
                .log();
                Err(error.into())
            }
        }
    }

    fn try_load_plugin(
        &mut self,
        path: &Path,
        symbol: &str,
        alias: &str,
    ) -> PluginResult<(&'static str, Vec<String>)> {
        if alias.is_empty() {
            return Err(PluginError::Manifest("plug-in alias must not be empty".to_string()));
        }
        let (kind, operators) = if wasm::loader::is_wasm_file(path)? {
            ("wasm", wasm::load_plugin(path, symbol, alias, self.fuel)?)
        } else {
            ("native", native::load_plugin(path, symbol, alias)?)
        };

        let named: Vec<(String, Arc<dyn OperatorImpl>)> = operators
            .into_iter()
            .map(|(name, op)| (format!("{alias}::{name}"), op))
            .collect();
        if let Some((clash, _)) = named.iter().find(|(name, _)| self.operators.contains_key(name)) {
            return Err(PluginError::DuplicateOperator(clash.clone()));
        }

        let names = named.iter().map(|(name, _)| name.clone()).collect();
        for (name, op) in named {
            self.insert(name, op);
        }
        Ok((kind, names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::FailingOperator;
    use crate::backends::wasm::TEST_PLUGIN_WAT;
    use crate::errors::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn wasm_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&wat::parse_str(TEST_PLUGIN_WAT).unwrap()).unwrap();
        file
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = OperatorRegistry::with_builtins(Version::new(9, 0), 1_000_000);
        assert!(registry.contains("add"));
        assert!(registry.contains("workflow_topology"));
        let (_, spec) = registry.lookup("min_max").unwrap();
        assert_eq!(spec.outputs.len(), 2);
    }

    #[test]
    fn test_topology_is_absent_on_old_versions() {
        let registry = OperatorRegistry::with_builtins(Version::new(7, 0), 1_000_000);
        assert!(!registry.contains("workflow_topology"));
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::new(1);
        let err = registry.lookup("nope").err().unwrap();
        assert_eq!(err.kind, ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = OperatorRegistry::new(1);
        registry.register("fail", Arc::new(FailingOperator)).unwrap();
        assert!(matches!(
            registry.register("fail", Arc::new(FailingOperator)),
            Err(PluginError::DuplicateOperator(_))
        ));
    }

    #[test]
    fn test_wasm_plugin_registers_under_alias() {
        let file = wasm_file();
        let mut registry = OperatorRegistry::with_builtins(Version::new(9, 0), 1_000_000);
        let before = registry.len();
        let names = registry
            .load_plugin(file.path(), "dpf_plugin_init", "demo")
            .unwrap();
        assert_eq!(names, vec!["demo::double", "demo::spin"]);
        assert_eq!(registry.len(), before + 2);
        let (_, spec) = registry.lookup("demo::double").unwrap();
        assert_eq!(spec.properties.plugin, "demo");
    }

    #[test]
    fn test_second_load_under_same_alias_registers_nothing() {
        let file = wasm_file();
        let mut registry = OperatorRegistry::new(1_000_000);
        registry.load_plugin(file.path(), "dpf_plugin_init", "demo").unwrap();
        let err = registry
            .load_plugin(file.path(), "dpf_plugin_init", "demo")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_plugin_file_is_io_error() {
        let mut registry = OperatorRegistry::new(1);
        let err = registry
            .load_plugin(Path::new("/nonexistent/plugin.wasm"), "init", "x")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
