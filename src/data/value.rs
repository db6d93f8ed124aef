// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The typed "any" that crosses every boundary.

use super::{
    Collection, Field, GenericDataContainer, MeshedRegion, PropertyField, Scoping, StringField,
    TimeFreqSupport, ValueType,
};
use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Opaque id of an entity owned by a backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(#[serde(with = "super::bytes")] Vec<u8>),
    IntVector(Vec<i64>),
    DoubleVector(Vec<f64>),
    Scoping(Scoping),
    Field(Field),
    PropertyField(PropertyField),
    StringField(StringField),
    MeshedRegion(MeshedRegion),
    TimeFreqSupport(TimeFreqSupport),
    FieldsContainer(Collection<Field>),
    ScopingsContainer(Collection<Scoping>),
    MeshesContainer(Collection<MeshedRegion>),
    PropertyFieldsContainer(Collection<PropertyField>),
    GenericDataContainersContainer(Collection<GenericDataContainer>),
    AnyCollection(Collection<Value>),
    GenericDataContainer(GenericDataContainer),
    /// An operator of the same session, passed by reference.
    Operator(ObjectId),
    Workflow(ObjectId),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::IntVector(_) => ValueType::IntVector,
            Value::DoubleVector(_) => ValueType::DoubleVector,
            Value::Scoping(_) => ValueType::Scoping,
            Value::Field(_) => ValueType::Field,
            Value::PropertyField(_) => ValueType::PropertyField,
            Value::StringField(_) => ValueType::StringField,
            Value::MeshedRegion(_) => ValueType::MeshedRegion,
            Value::TimeFreqSupport(_) => ValueType::TimeFreqSupport,
            Value::FieldsContainer(_) => ValueType::FieldsContainer,
            Value::ScopingsContainer(_) => ValueType::ScopingsContainer,
            Value::MeshesContainer(_) => ValueType::MeshesContainer,
            Value::PropertyFieldsContainer(_) => ValueType::PropertyFieldsContainer,
            Value::GenericDataContainersContainer(_) => ValueType::GenericDataContainersContainer,
            Value::AnyCollection(_) => ValueType::AnyCollection,
            Value::GenericDataContainer(_) => ValueType::GenericDataContainer,
            Value::Operator(_) => ValueType::Operator,
            Value::Workflow(_) => ValueType::Workflow,
        }
    }

    /// Refuses the cast when the dynamic type differs.
    pub fn cast<T: DataType>(self) -> Result<T> {
        T::from_value(self)
    }

    pub fn downcast_ref<T: DataType>(&self) -> Option<&T> {
        T::from_value_ref(self)
    }

    /// True when the value, or anything nested in it, refers to a session
    /// object and so cannot leave that session.
    pub fn has_object_refs(&self) -> bool {
        match self {
            Value::Operator(_) | Value::Workflow(_) => true,
            Value::AnyCollection(c) => c.iter().any(|(_, v)| v.has_object_refs()),
            Value::GenericDataContainer(gdc) => gdc.values().any(Value::has_object_refs),
            Value::GenericDataContainersContainer(c) => {
                c.iter().any(|(_, gdc)| gdc.values().any(Value::has_object_refs))
            }
            _ => false,
        }
    }

    /// Approximate in-memory footprint of the payload, in bytes.
    pub fn byte_size(&self) -> u64 {
        fn field(f: &Field) -> u64 {
            (f.data().len() * 8 + f.scoping().len() * 4) as u64
        }
        fn property(p: &PropertyField) -> u64 {
            (p.data().len() * 8 + p.scoping().len() * 4) as u64
                + p.data_pointer().map_or(0, |d| d.len() * 8) as u64
        }
        fn mesh(m: &MeshedRegion) -> u64 {
            field(m.nodes())
                + property(m.element_types())
                + property(m.connectivity())
                + m.faces().map_or(0, property)
        }
        match self {
            Value::Int(_) | Value::Double(_) => 8,
            Value::Bool(_) => 1,
            Value::Operator(_) | Value::Workflow(_) => 8,
            Value::String(s) => s.len() as u64,
            Value::Bytes(b) => b.len() as u64,
            Value::IntVector(v) => (v.len() * 8) as u64,
            Value::DoubleVector(v) => (v.len() * 8) as u64,
            Value::Scoping(s) => (s.len() * 4) as u64,
            Value::Field(f) => field(f),
            Value::PropertyField(p) => property(p),
            Value::StringField(s) => {
                (s.len() * 4) as u64 + s.data().iter().map(|d| d.len() as u64).sum::<u64>()
            }
            Value::MeshedRegion(m) => mesh(m),
            Value::TimeFreqSupport(t) => field(t.time_frequencies()),
            Value::FieldsContainer(c) => c.iter().map(|(_, f)| field(f)).sum(),
            Value::ScopingsContainer(c) => c.iter().map(|(_, s)| (s.len() * 4) as u64).sum(),
            Value::MeshesContainer(c) => c.iter().map(|(_, m)| mesh(m)).sum(),
            Value::PropertyFieldsContainer(c) => c.iter().map(|(_, p)| property(p)).sum(),
            Value::GenericDataContainersContainer(c) => c
                .iter()
                .map(|(_, g)| g.values().map(Value::byte_size).sum::<u64>())
                .sum(),
            Value::AnyCollection(c) => c.iter().map(|(_, v)| v.byte_size()).sum(),
            Value::GenericDataContainer(g) => g.values().map(Value::byte_size).sum(),
        }
    }
}

/// A concrete type that can live inside a [`Value`].
pub trait DataType: Sized + Into<Value> {
    const VALUE_TYPE: ValueType;

    fn from_value(value: Value) -> Result<Self>;

    fn from_value_ref(value: &Value) -> Option<&Self>;
}

macro_rules! data_type {
    ($ty:ty, $variant:ident) => {
        impl DataType for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(DpfError::type_mismatch(Self::VALUE_TYPE, other.value_type())),
                }
            }

            fn from_value_ref(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(inner: $ty) -> Self {
                Value::$variant(inner)
            }
        }
    };
}

data_type!(i64, Int);
data_type!(f64, Double);
data_type!(bool, Bool);
data_type!(String, String);
data_type!(Vec<u8>, Bytes);
data_type!(Vec<i64>, IntVector);
data_type!(Vec<f64>, DoubleVector);
data_type!(Scoping, Scoping);
data_type!(Field, Field);
data_type!(PropertyField, PropertyField);
data_type!(StringField, StringField);
data_type!(MeshedRegion, MeshedRegion);
data_type!(TimeFreqSupport, TimeFreqSupport);
data_type!(Collection<Field>, FieldsContainer);
data_type!(Collection<Scoping>, ScopingsContainer);
data_type!(Collection<MeshedRegion>, MeshesContainer);
data_type!(Collection<PropertyField>, PropertyFieldsContainer);
data_type!(Collection<GenericDataContainer>, GenericDataContainersContainer);
data_type!(Collection<Value>, AnyCollection);
data_type!(GenericDataContainer, GenericDataContainer);

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Operator(id) => write!(f, "operator {id}"),
            Value::Workflow(id) => write!(f, "workflow {id}"),
            other => write!(f, "<{}>", other.value_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LabelSpace;
    use crate::errors::ErrorKind;

    #[test]
    fn test_cast_to_matching_type() {
        let f = Field::scalar(Scoping::nodal(vec![1, 2]), vec![0.5, 1.5]).unwrap();
        let value = Value::from(f.clone());
        assert_eq!(value.value_type(), ValueType::Field);
        assert_eq!(value.downcast_ref::<Field>(), Some(&f));
        assert_eq!(value.cast::<Field>().unwrap(), f);
    }

    #[test]
    fn test_cast_to_wrong_type_is_refused() {
        let err = Value::from(3).cast::<Scoping>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        assert_eq!(err.message, "expected scoping, found int");
    }

    #[test]
    fn test_object_refs_are_found_when_nested() {
        let mut gdc = GenericDataContainer::new();
        gdc.set_property("op", Value::Operator(ObjectId(4)));
        assert!(Value::from(gdc).has_object_refs());

        let mut any = Collection::new(["id"]);
        any.add_entry(LabelSpace::from([("id", 0)]), Value::from(1.5)).unwrap();
        assert!(!Value::from(any).has_object_refs());
    }

    #[test]
    fn test_byte_size_of_field() {
        let f = Field::scalar(Scoping::nodal(vec![1, 2, 3]), vec![0.0; 3]).unwrap();
        assert_eq!(Value::from(f).byte_size(), 3 * 8 + 3 * 4);
    }

    #[test]
    fn test_both_wire_encodings_preserve_values() {
        let value = Value::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_vec(&value).unwrap();
        let bin = bincode::serialize(&value).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&json).unwrap(), value);
        assert_eq!(bincode::deserialize::<Value>(&bin).unwrap(), value);
    }
}
