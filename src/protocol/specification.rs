// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Frozen description of an operator: pins, config options and properties.

use crate::data::{TypeSet, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinSpec {
    pub name: String,
    pub types: TypeSet,
    pub optional: bool,
    pub ellipsis: bool,
    pub document: String,
}

impl PinSpec {
    pub fn required(name: &str, types: TypeSet, document: &str) -> Self {
        Self {
            name: name.to_string(),
            types,
            optional: false,
            ellipsis: false,
            document: document.to_string(),
        }
    }

    pub fn optional(name: &str, types: TypeSet, document: &str) -> Self {
        Self {
            optional: true,
            ..Self::required(name, types, document)
        }
    }

    /// Variadic pin: this number and every higher one share the description.
    pub fn ellipsis(mut self) -> Self {
        self.ellipsis = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    pub default: Value,
    pub document: String,
}

impl ConfigOption {
    pub fn new(name: &str, default: impl Into<Value>, document: &str) -> Self {
        Self {
            name: name.to_string(),
            default: default.into(),
            document: document.to_string(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.default.value_type()
    }
}

/// Categorical metadata shown by documentation and discovery tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorProperties {
    pub category: String,
    pub plugin: String,
    pub license: String,
    pub changelog: String,
    pub user_name: String,
    pub scripting_name: String,
    pub exposure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub description: String,
    pub inputs: BTreeMap<u32, PinSpec>,
    pub outputs: BTreeMap<u32, PinSpec>,
    pub config_options: Vec<ConfigOption>,
    pub properties: OperatorProperties,
}

impl Specification {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            config_options: Vec::new(),
            properties: OperatorProperties::default(),
        }
    }

    pub fn input(mut self, pin: u32, spec: PinSpec) -> Self {
        self.inputs.insert(pin, spec);
        self
    }

    pub fn output(mut self, pin: u32, spec: PinSpec) -> Self {
        self.outputs.insert(pin, spec);
        self
    }

    pub fn config(mut self, option: ConfigOption) -> Self {
        self.config_options.push(option);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.properties.category = category.to_string();
        self
    }

    pub fn plugin(mut self, plugin: &str) -> Self {
        self.properties.plugin = plugin.to_string();
        self
    }

    pub fn scripting_name(mut self, name: &str) -> Self {
        self.properties.scripting_name = name.to_string();
        self
    }

    /// Description of input `pin`, following an ellipsis pin below it.
    pub fn input_pin(&self, pin: u32) -> Option<&PinSpec> {
        Self::lookup(&self.inputs, pin)
    }

    pub fn output_pin(&self, pin: u32) -> Option<&PinSpec> {
        Self::lookup(&self.outputs, pin)
    }

    fn lookup(pins: &BTreeMap<u32, PinSpec>, pin: u32) -> Option<&PinSpec> {
        if let Some(spec) = pins.get(&pin) {
            return Some(spec);
        }
        pins.range(..pin)
            .next_back()
            .map(|(_, spec)| spec)
            .filter(|spec| spec.ellipsis)
    }

    pub fn config_option(&self, name: &str) -> Option<&ConfigOption> {
        self.config_options.iter().find(|o| o.name == name)
    }

    /// First input pin whose accepted types include `ty`.
    pub fn first_input_accepting(&self, ty: ValueType) -> Option<u32> {
        self.inputs
            .iter()
            .find(|(_, spec)| spec.types.contains(ty))
            .map(|(pin, _)| *pin)
    }

    pub fn default_config(&self) -> BTreeMap<String, Value> {
        self.config_options
            .iter()
            .map(|o| (o.name.clone(), o.default.clone()))
            .collect()
    }
}
