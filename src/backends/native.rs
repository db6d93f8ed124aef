// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Native operator plug-ins loaded from dynamic libraries.
//!
//! The initializer symbol has the signature
//! `unsafe extern "C" fn() -> *mut dyn NativePlugin` and hands ownership of
//! a boxed plug-in to the engine. The library stays mapped for as long as
//! any operator it produced is alive.

use crate::data::Value;
use crate::errors::{PluginError, PluginResult, Result};
use crate::protocol::Specification;
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use libloading::{Library, Symbol};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// What a native plug-in exposes to the engine.
pub trait NativePlugin: Send + Sync {
    /// Operators to register, by name without the alias prefix.
    fn operators(&self) -> Vec<(String, Arc<dyn OperatorImpl>)>;
}

/// Signature of the initializer symbol.
#[allow(improper_ctypes_definitions)]
pub type PluginInitFn = unsafe extern "C" fn() -> *mut dyn NativePlugin;

/// Keeps the owning library loaded under a plug-in operator.
struct NativeOperator {
    inner: Arc<dyn OperatorImpl>,
    plugin_name: String,
    _library: Arc<Library>,
}

impl OperatorImpl for NativeOperator {
    fn specification(&self) -> Specification {
        self.inner.specification().plugin(&self.plugin_name)
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        self.inner.run(ctx)
    }

    fn is_incremental(&self, config: &BTreeMap<String, Value>) -> bool {
        self.inner.is_incremental(config)
    }

    fn accumulate(&self, previous: Outputs, current: Outputs) -> Result<Outputs> {
        self.inner.accumulate(previous, current)
    }
}

/// Open `path`, call `symbol` and collect the operators it lists.
///
/// # Safety contract
/// The library must have been built against this crate's `NativePlugin`
/// trait with the same compiler; nothing can check that at run time.
pub fn load_plugin(
    path: &Path,
    symbol: &str,
    plugin_name: &str,
) -> PluginResult<Vec<(String, Arc<dyn OperatorImpl>)>> {
    let library = Arc::new(unsafe { Library::new(path)? });
    let plugin: Box<dyn NativePlugin> = unsafe {
        let init: Symbol<PluginInitFn> = library.get(symbol.as_bytes())?;
        let raw = init();
        if raw.is_null() {
            return Err(PluginError::NullPlugin(symbol.to_string()));
        }
        Box::from_raw(raw)
    };

    let operators = plugin
        .operators()
        .into_iter()
        .map(|(name, inner)| {
            let op: Arc<dyn OperatorImpl> = Arc::new(NativeOperator {
                inner,
                plugin_name: plugin_name.to_string(),
                _library: Arc::clone(&library),
            });
            (name, op)
        })
        .collect();
    Ok(operators)
}
