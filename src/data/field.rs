// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Located arrays: [`Field`] (doubles, unit-tagged), [`PropertyField`]
//! (integers) and [`StringField`] (one string per entity).
//!
//! All three keep their buffer entity-major and sized to the scoping; every
//! mutator checks the size before touching anything.

use super::{Dimensionality, Location, Scoping, TimeFreqSupport};
use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};

fn check_len(what: &str, actual: usize, entities: usize, components: usize) -> Result<()> {
    if actual != entities * components {
        return Err(DpfError::invalid_argument(format!(
            "{what} holds {actual} values but {entities} entities of {components} components need {}",
            entities * components
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawField")]
pub struct Field {
    name: String,
    unit: String,
    dimensionality: Dimensionality,
    scoping: Scoping,
    data: Vec<f64>,
    time_freq_support: Option<Box<TimeFreqSupport>>,
}

/// Wire shape of a [`Field`], checked before it becomes one.
#[derive(Deserialize)]
struct RawField {
    name: String,
    unit: String,
    dimensionality: Dimensionality,
    scoping: Scoping,
    data: Vec<f64>,
    time_freq_support: Option<Box<TimeFreqSupport>>,
}

impl TryFrom<RawField> for Field {
    type Error = DpfError;

    fn try_from(raw: RawField) -> Result<Self> {
        let mut field = Field::new(raw.dimensionality, raw.scoping, raw.data)?
            .with_name(raw.name)
            .with_unit(raw.unit);
        field.time_freq_support = raw.time_freq_support;
        Ok(field)
    }
}

impl Field {
    pub fn new(dimensionality: Dimensionality, scoping: Scoping, data: Vec<f64>) -> Result<Self> {
        check_len(
            "field data",
            data.len(),
            scoping.len(),
            dimensionality.component_count(),
        )?;
        Ok(Self {
            name: String::new(),
            unit: String::new(),
            dimensionality,
            scoping,
            data,
            time_freq_support: None,
        })
    }

    pub fn scalar(scoping: Scoping, data: Vec<f64>) -> Result<Self> {
        Self::new(Dimensionality::scalar(), scoping, data)
    }

    /// Field with no entities yet, to be filled with [`Field::append`].
    pub fn empty(dimensionality: Dimensionality, location: impl Into<Location>) -> Self {
        Self {
            name: String::new(),
            unit: String::new(),
            dimensionality,
            scoping: Scoping::new(location, Vec::new()),
            data: Vec::new(),
            time_freq_support: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_time_freq_support(mut self, support: TimeFreqSupport) -> Self {
        self.time_freq_support = Some(Box::new(support));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn set_unit(&mut self, unit: impl Into<String>) {
        self.unit = unit.into();
    }

    pub fn location(&self) -> &Location {
        self.scoping.location()
    }

    pub fn dimensionality(&self) -> &Dimensionality {
        &self.dimensionality
    }

    pub fn component_count(&self) -> usize {
        self.dimensionality.component_count()
    }

    pub fn scoping(&self) -> &Scoping {
        &self.scoping
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.scoping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scoping.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable view of the buffer. Its length cannot change through it.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn time_freq_support(&self) -> Option<&TimeFreqSupport> {
        self.time_freq_support.as_deref()
    }

    pub fn set_time_freq_support(&mut self, support: Option<TimeFreqSupport>) {
        self.time_freq_support = support.map(Box::new);
    }

    pub fn get_entity_data(&self, index: usize) -> Option<&[f64]> {
        let cc = self.component_count();
        if index >= self.len() {
            return None;
        }
        Some(&self.data[index * cc..(index + 1) * cc])
    }

    pub fn get_entity_data_by_id(&self, id: i32) -> Option<&[f64]> {
        self.scoping
            .index(id)
            .and_then(|index| self.get_entity_data(index))
    }

    pub fn set_entity_data(&mut self, index: usize, values: &[f64]) -> Result<()> {
        let cc = self.component_count();
        check_len("entity data", values.len(), 1, cc)?;
        if index >= self.len() {
            return Err(DpfError::invalid_argument(format!(
                "entity index {index} out of range for {} entities",
                self.len()
            )));
        }
        self.data[index * cc..(index + 1) * cc].copy_from_slice(values);
        Ok(())
    }

    /// Add one entity at the end of the scoping.
    pub fn append(&mut self, id: i32, values: &[f64]) -> Result<()> {
        check_len("entity data", values.len(), 1, self.component_count())?;
        self.scoping.push(id);
        self.data.extend_from_slice(values);
        Ok(())
    }

    /// Replace scoping and data together.
    pub fn set_data(&mut self, scoping: Scoping, data: Vec<f64>) -> Result<()> {
        check_len("field data", data.len(), scoping.len(), self.component_count())?;
        self.scoping = scoping;
        self.data = data;
        Ok(())
    }

    /// Consume the field, keeping metadata but swapping in new content.
    pub fn with_data(mut self, scoping: Scoping, data: Vec<f64>) -> Result<Self> {
        self.set_data(scoping, data)?;
        Ok(self)
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
}

/// Integer payload located on a scoping. Variable-length entities (mesh
/// connectivity) carry a `data_pointer` of start offsets, one per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPropertyField")]
pub struct PropertyField {
    dimensionality: Dimensionality,
    scoping: Scoping,
    data: Vec<i64>,
    data_pointer: Option<Vec<usize>>,
}

#[derive(Deserialize)]
struct RawPropertyField {
    dimensionality: Dimensionality,
    scoping: Scoping,
    data: Vec<i64>,
    data_pointer: Option<Vec<usize>>,
}

impl TryFrom<RawPropertyField> for PropertyField {
    type Error = DpfError;

    fn try_from(raw: RawPropertyField) -> Result<Self> {
        match raw.data_pointer {
            Some(data_pointer) => {
                if raw.dimensionality.component_count() != 1 {
                    return Err(DpfError::invalid_argument(
                        "variable-length property fields are scalar",
                    ));
                }
                Self::variable_length(raw.scoping, raw.data, data_pointer)
            }
            None => Self::new(raw.dimensionality, raw.scoping, raw.data),
        }
    }
}

impl PropertyField {
    pub fn new(dimensionality: Dimensionality, scoping: Scoping, data: Vec<i64>) -> Result<Self> {
        check_len(
            "property field data",
            data.len(),
            scoping.len(),
            dimensionality.component_count(),
        )?;
        Ok(Self {
            dimensionality,
            scoping,
            data,
            data_pointer: None,
        })
    }

    pub fn scalar(scoping: Scoping, data: Vec<i64>) -> Result<Self> {
        Self::new(Dimensionality::scalar(), scoping, data)
    }

    pub fn variable_length(scoping: Scoping, data: Vec<i64>, data_pointer: Vec<usize>) -> Result<Self> {
        if data_pointer.len() != scoping.len() {
            return Err(DpfError::invalid_argument(format!(
                "data pointer has {} offsets for {} entities",
                data_pointer.len(),
                scoping.len()
            )));
        }
        let ordered = data_pointer.windows(2).all(|w| w[0] <= w[1]);
        if !ordered || data_pointer.last().is_some_and(|last| *last > data.len()) {
            return Err(DpfError::invalid_argument(
                "data pointer offsets must be non-decreasing and within the data",
            ));
        }
        Ok(Self {
            dimensionality: Dimensionality::scalar(),
            scoping,
            data,
            data_pointer: Some(data_pointer),
        })
    }

    /// Empty field whose entities will each take a variable number of values.
    pub fn empty_variable_length(location: impl Into<Location>) -> Self {
        Self {
            dimensionality: Dimensionality::scalar(),
            scoping: Scoping::new(location, Vec::new()),
            data: Vec::new(),
            data_pointer: Some(Vec::new()),
        }
    }

    pub fn location(&self) -> &Location {
        self.scoping.location()
    }

    pub fn dimensionality(&self) -> &Dimensionality {
        &self.dimensionality
    }

    pub fn component_count(&self) -> usize {
        self.dimensionality.component_count()
    }

    pub fn scoping(&self) -> &Scoping {
        &self.scoping
    }

    pub fn len(&self) -> usize {
        self.scoping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scoping.is_empty()
    }

    pub fn data(&self) -> &[i64] {
        &self.data
    }

    pub fn data_pointer(&self) -> Option<&[usize]> {
        self.data_pointer.as_deref()
    }

    fn bounds(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.len() {
            return None;
        }
        match &self.data_pointer {
            Some(ptr) => {
                let end = ptr.get(index + 1).copied().unwrap_or(self.data.len());
                Some((ptr[index], end))
            }
            None => {
                let cc = self.component_count();
                Some((index * cc, (index + 1) * cc))
            }
        }
    }

    pub fn get_entity_data(&self, index: usize) -> Option<&[i64]> {
        self.bounds(index).map(|(start, end)| &self.data[start..end])
    }

    pub fn get_entity_data_by_id(&self, id: i32) -> Option<&[i64]> {
        self.scoping
            .index(id)
            .and_then(|index| self.get_entity_data(index))
    }

    pub fn append(&mut self, id: i32, values: &[i64]) -> Result<()> {
        match &mut self.data_pointer {
            Some(ptr) => ptr.push(self.data.len()),
            None => check_len("entity data", values.len(), 1, self.dimensionality.component_count())?,
        }
        self.scoping.push(id);
        self.data.extend_from_slice(values);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStringField")]
pub struct StringField {
    scoping: Scoping,
    data: Vec<String>,
}

#[derive(Deserialize)]
struct RawStringField {
    scoping: Scoping,
    data: Vec<String>,
}

impl TryFrom<RawStringField> for StringField {
    type Error = DpfError;

    fn try_from(raw: RawStringField) -> Result<Self> {
        Self::new(raw.scoping, raw.data)
    }
}

impl StringField {
    pub fn new(scoping: Scoping, data: Vec<String>) -> Result<Self> {
        check_len("string field data", data.len(), scoping.len(), 1)?;
        Ok(Self { scoping, data })
    }

    pub fn location(&self) -> &Location {
        self.scoping.location()
    }

    pub fn scoping(&self) -> &Scoping {
        &self.scoping
    }

    pub fn len(&self) -> usize {
        self.scoping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scoping.is_empty()
    }

    pub fn data(&self) -> &[String] {
        &self.data
    }

    pub fn get_entity_data(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(String::as_str)
    }

    pub fn get_entity_data_by_id(&self, id: i32) -> Option<&str> {
        self.scoping
            .index(id)
            .and_then(|index| self.get_entity_data(index))
    }

    pub fn append(&mut self, id: i32, value: impl Into<String>) {
        self.scoping.push(id);
        self.data.push(value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn vector_field() -> Field {
        Field::new(
            Dimensionality::vector_3d(),
            Scoping::nodal(vec![1, 2]),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
        .with_unit("m")
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Field::new(
            Dimensionality::vector_3d(),
            Scoping::nodal(vec![1, 2]),
            vec![1.0; 5],
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_deserialize_checks_buffer_size() {
        let json = serde_json::to_value(vector_field()).unwrap();
        assert_eq!(serde_json::from_value::<Field>(json.clone()).unwrap(), vector_field());

        let mut short = json;
        short["data"].as_array_mut().unwrap().pop();
        assert!(serde_json::from_value::<Field>(short).is_err());

        let mut strings = serde_json::to_value(
            StringField::new(Scoping::nodal(vec![1, 2]), vec!["a".into(), "b".into()]).unwrap(),
        )
        .unwrap();
        strings["data"].as_array_mut().unwrap().push("c".into());
        assert!(serde_json::from_value::<StringField>(strings).is_err());
    }

    #[test]
    fn test_entity_access() {
        let f = vector_field();
        assert_eq!(f.get_entity_data(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(f.get_entity_data_by_id(1), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(f.get_entity_data(2), None);
        assert_eq!(f.unit(), "m");
    }

    #[test]
    fn test_buffer_size_holds_after_mutations() {
        let mut f = vector_field();
        f.append(7, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(f.data().len(), f.len() * f.component_count());

        assert!(f.append(8, &[1.0]).is_err());
        assert_eq!(f.data().len(), f.len() * f.component_count());

        f.set_entity_data(0, &[0.0, 0.0, 0.0]).unwrap();
        assert!(f.set_entity_data(0, &[0.0]).is_err());
        assert!(f.set_data(Scoping::nodal(vec![1]), vec![1.0, 2.0]).is_err());
        assert_eq!(f.data().len(), f.len() * f.component_count());

        f.set_data(Scoping::nodal(vec![3]), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.data().len(), 3);
    }

    #[test]
    fn test_symmetric_matrix_entities_have_six_values() {
        let mut f = Field::empty(Dimensionality::symmetric_matrix(3), Location::Elemental);
        f.append(10, &[1.0; 6]).unwrap();
        assert_eq!(f.get_entity_data_by_id(10).unwrap().len(), 6);
    }

    #[test]
    fn test_property_field_variable_length() {
        let mut pf = PropertyField::empty_variable_length(Location::Elemental);
        pf.append(1, &[1, 2, 3, 4]).unwrap();
        pf.append(2, &[4, 5, 6]).unwrap();
        assert_eq!(pf.get_entity_data(0), Some(&[1, 2, 3, 4][..]));
        assert_eq!(pf.get_entity_data_by_id(2), Some(&[4, 5, 6][..]));
        assert_eq!(pf.data_pointer(), Some(&[0, 4][..]));
    }

    #[test]
    fn test_property_field_rejects_bad_pointer() {
        let scoping = Scoping::elemental(vec![1, 2]);
        assert!(PropertyField::variable_length(scoping.clone(), vec![1, 2], vec![0, 3]).is_err());
        assert!(PropertyField::variable_length(scoping, vec![1, 2], vec![1, 0]).is_err());
    }

    #[test]
    fn test_string_field() {
        let mut sf = StringField::new(Scoping::nodal(vec![3]), vec!["top".into()]).unwrap();
        sf.append(9, "bottom");
        assert_eq!(sf.get_entity_data_by_id(9), Some("bottom"));
        assert!(StringField::new(Scoping::nodal(vec![1, 2]), vec![]).is_err());
    }
}
