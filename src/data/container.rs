// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{DataType, Value, ValueType};
use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named heterogeneous properties, with the concrete type of each property
/// available without reading its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericDataContainer {
    properties: BTreeMap<String, Value>,
}

impl GenericDataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Typed read; fails on a missing property or a different type.
    pub fn get_property_as<T: DataType + Clone>(&self, name: &str) -> Result<T> {
        let value = self
            .properties
            .get(name)
            .ok_or_else(|| DpfError::invalid_argument(format!("no property named '{name}'")))?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| DpfError::type_mismatch(T::VALUE_TYPE, value.value_type()))
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Name to concrete type side table.
    pub fn property_types(&self) -> BTreeMap<String, ValueType> {
        self.properties
            .iter()
            .map(|(name, value)| (name.clone(), value.value_type()))
            .collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.properties.values()
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Scoping;
    use crate::errors::ErrorKind;

    #[test]
    fn test_typed_access_and_side_table() {
        let gdc = GenericDataContainer::new()
            .with_property("pin", 3)
            .with_property("chunks", Scoping::nodal(vec![1, 2]));

        assert_eq!(gdc.get_property_as::<i64>("pin").unwrap(), 3);
        let types = gdc.property_types();
        assert_eq!(types["chunks"], ValueType::Scoping);
        assert_eq!(types["pin"], ValueType::Int);
    }

    #[test]
    fn test_wrong_type_and_missing_name() {
        let gdc = GenericDataContainer::new().with_property("name", "mesh");
        assert_eq!(
            gdc.get_property_as::<f64>("name").unwrap_err().kind,
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            gdc.get_property_as::<f64>("other").unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }
}
