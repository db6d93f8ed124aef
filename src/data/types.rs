// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Dynamic type tags and the accepted-type bitmask of operator pins.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// The dynamic type of a [`super::Value`]. One bit per variant in a [`TypeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Double,
    Bool,
    String,
    Bytes,
    IntVector,
    DoubleVector,
    Scoping,
    Field,
    PropertyField,
    StringField,
    MeshedRegion,
    TimeFreqSupport,
    FieldsContainer,
    ScopingsContainer,
    MeshesContainer,
    PropertyFieldsContainer,
    GenericDataContainersContainer,
    AnyCollection,
    GenericDataContainer,
    Operator,
    Workflow,
}

impl ValueType {
    pub const ALL: [ValueType; 22] = [
        ValueType::Int,
        ValueType::Double,
        ValueType::Bool,
        ValueType::String,
        ValueType::Bytes,
        ValueType::IntVector,
        ValueType::DoubleVector,
        ValueType::Scoping,
        ValueType::Field,
        ValueType::PropertyField,
        ValueType::StringField,
        ValueType::MeshedRegion,
        ValueType::TimeFreqSupport,
        ValueType::FieldsContainer,
        ValueType::ScopingsContainer,
        ValueType::MeshesContainer,
        ValueType::PropertyFieldsContainer,
        ValueType::GenericDataContainersContainer,
        ValueType::AnyCollection,
        ValueType::GenericDataContainer,
        ValueType::Operator,
        ValueType::Workflow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::IntVector => "vector<int>",
            ValueType::DoubleVector => "vector<double>",
            ValueType::Scoping => "scoping",
            ValueType::Field => "field",
            ValueType::PropertyField => "property_field",
            ValueType::StringField => "string_field",
            ValueType::MeshedRegion => "meshed_region",
            ValueType::TimeFreqSupport => "time_freq_support",
            ValueType::FieldsContainer => "fields_container",
            ValueType::ScopingsContainer => "scopings_container",
            ValueType::MeshesContainer => "meshes_container",
            ValueType::PropertyFieldsContainer => "property_fields_container",
            ValueType::GenericDataContainersContainer => "generic_data_containers_container",
            ValueType::AnyCollection => "any_collection",
            ValueType::GenericDataContainer => "generic_data_container",
            ValueType::Operator => "operator",
            ValueType::Workflow => "workflow",
        }
    }

    /// Everything but scalars and object references is handed back as a
    /// remote object rather than inlined in the reply.
    pub fn is_bulky(self) -> bool {
        !matches!(
            self,
            ValueType::Int
                | ValueType::Double
                | ValueType::Bool
                | ValueType::String
                | ValueType::Operator
                | ValueType::Workflow
        )
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of value types accepted by a pin. Checking a value is one AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ValueType>", into = "Vec<ValueType>")]
pub struct TypeSet(u32);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);
    pub const ANY: TypeSet = TypeSet((1 << ValueType::ALL.len()) - 1);

    pub const fn of(types: &[ValueType]) -> TypeSet {
        let mut bits = 0;
        let mut i = 0;
        while i < types.len() {
            bits |= types[i].bit();
            i += 1;
        }
        TypeSet(bits)
    }

    pub const fn single(ty: ValueType) -> TypeSet {
        TypeSet(ty.bit())
    }

    pub const fn contains(self, ty: ValueType) -> bool {
        self.0 & ty.bit() != 0
    }

    pub const fn intersects(self, other: TypeSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ValueType> {
        ValueType::ALL.into_iter().filter(move |ty| self.contains(*ty))
    }
}

impl From<Vec<ValueType>> for TypeSet {
    fn from(types: Vec<ValueType>) -> Self {
        TypeSet::of(&types)
    }
}

impl From<TypeSet> for Vec<ValueType> {
    fn from(set: TypeSet) -> Self {
        set.iter().collect()
    }
}

impl Display for TypeSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if *self == TypeSet::ANY {
            return f.write_str("{any}");
        }
        let names: Vec<&str> = self.iter().map(ValueType::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
