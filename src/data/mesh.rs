// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Meshes: node coordinates, element connectivity, faces and named selections.

use super::{Dimensionality, Field, Location, PropertyField, Scoping};
use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A populated mesh. Connectivity stores node *indices*, not ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshedRegion {
    unit: String,
    nodes: Field,
    element_types: PropertyField,
    connectivity: PropertyField,
    faces: Option<PropertyField>,
    named_selections: BTreeMap<String, Scoping>,
}

impl MeshedRegion {
    pub fn builder() -> MeshedRegionBuilder {
        MeshedRegionBuilder::default()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.connectivity.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.as_ref().map_or(0, PropertyField::len)
    }

    pub fn nodes(&self) -> &Field {
        &self.nodes
    }

    pub fn node_scoping(&self) -> &Scoping {
        self.nodes.scoping()
    }

    pub fn element_scoping(&self) -> &Scoping {
        self.connectivity.scoping()
    }

    pub fn element_types(&self) -> &PropertyField {
        &self.element_types
    }

    pub fn connectivity(&self) -> &PropertyField {
        &self.connectivity
    }

    pub fn faces(&self) -> Option<&PropertyField> {
        self.faces.as_ref()
    }

    pub fn node_coordinates(&self, node_id: i32) -> Option<&[f64]> {
        self.nodes.get_entity_data_by_id(node_id)
    }

    pub fn element_type(&self, element_id: i32) -> Option<i64> {
        self.element_types
            .get_entity_data_by_id(element_id)
            .and_then(|t| t.first().copied())
    }

    /// Node ids of an element, in connectivity order.
    pub fn element_nodes(&self, element_id: i32) -> Option<Vec<i32>> {
        let indices = self.connectivity.get_entity_data_by_id(element_id)?;
        indices
            .iter()
            .map(|i| usize::try_from(*i).ok().and_then(|i| self.node_scoping().id(i)))
            .collect()
    }

    pub fn named_selection(&self, name: &str) -> Option<&Scoping> {
        self.named_selections.get(name)
    }

    pub fn named_selection_names(&self) -> impl Iterator<Item = &str> {
        self.named_selections.keys().map(String::as_str)
    }
}

/// Incremental construction of a [`MeshedRegion`] before first use.
#[derive(Debug, Default)]
pub struct MeshedRegionBuilder {
    unit: String,
    nodes: Vec<(i32, [f64; 3])>,
    elements: Vec<(i32, i64, Vec<i32>)>,
    faces: Vec<(i32, Vec<i32>)>,
    named_selections: BTreeMap<String, Scoping>,
}

impl MeshedRegionBuilder {
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn node(mut self, id: i32, coordinates: [f64; 3]) -> Self {
        self.nodes.push((id, coordinates));
        self
    }

    pub fn element(mut self, id: i32, element_type: i64, node_ids: &[i32]) -> Self {
        self.elements.push((id, element_type, node_ids.to_vec()));
        self
    }

    pub fn face(mut self, id: i32, node_ids: &[i32]) -> Self {
        self.faces.push((id, node_ids.to_vec()));
        self
    }

    pub fn named_selection(mut self, name: impl Into<String>, scoping: Scoping) -> Self {
        self.named_selections.insert(name.into(), scoping);
        self
    }

    pub fn build(self) -> Result<MeshedRegion> {
        let mut nodes = Field::empty(Dimensionality::vector_3d(), Location::Nodal)
            .with_name("coordinates")
            .with_unit(self.unit.clone());
        for (id, xyz) in &self.nodes {
            if nodes.scoping().contains(*id) {
                return Err(DpfError::invalid_argument(format!("duplicate node id {id}")));
            }
            nodes.append(*id, xyz)?;
        }

        let node_indices = |owner: &str, id: i32, node_ids: &[i32]| -> Result<Vec<i64>> {
            node_ids
                .iter()
                .map(|n| {
                    nodes.scoping().index(*n).map(|i| i as i64).ok_or_else(|| {
                        DpfError::invalid_argument(format!("{owner} {id} references unknown node {n}"))
                    })
                })
                .collect()
        };

        let mut element_types = PropertyField::scalar(Scoping::elemental(Vec::new()), Vec::new())?;
        let mut connectivity = PropertyField::empty_variable_length(Location::Elemental);
        for (id, element_type, node_ids) in &self.elements {
            connectivity.append(*id, &node_indices("element", *id, node_ids)?)?;
            element_types.append(*id, &[*element_type])?;
        }

        let faces = if self.faces.is_empty() {
            None
        } else {
            let mut faces = PropertyField::empty_variable_length(Location::Faces);
            for (id, node_ids) in &self.faces {
                faces.append(*id, &node_indices("face", *id, node_ids)?)?;
            }
            Some(faces)
        };

        Ok(MeshedRegion {
            unit: self.unit,
            nodes,
            element_types,
            connectivity,
            faces,
            named_selections: self.named_selections,
        })
    }
}
