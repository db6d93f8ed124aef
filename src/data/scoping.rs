// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::Location;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// An ordered sequence of entity ids tagged with a [`Location`].
///
/// `id(index)` is a slice access; `index(id)` builds a reverse map on first
/// use and keeps it until the ids change. When an id appears more than once
/// its first position wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scoping {
    location: Location,
    ids: Vec<i32>,
    #[serde(skip)]
    index: OnceLock<HashMap<i32, usize>>,
}

impl Scoping {
    pub fn new(location: impl Into<Location>, ids: Vec<i32>) -> Self {
        Self {
            location: location.into(),
            ids,
            index: OnceLock::new(),
        }
    }

    pub fn nodal(ids: Vec<i32>) -> Self {
        Self::new(Location::Nodal, ids)
    }

    pub fn elemental(ids: Vec<i32>) -> Self {
        Self::new(Location::Elemental, ids)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn set_location(&mut self, location: impl Into<Location>) {
        self.location = location.into();
    }

    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id stored at `index`.
    pub fn id(&self, index: usize) -> Option<i32> {
        self.ids.get(index).copied()
    }

    /// Position of `id` in the scoping.
    pub fn index(&self, id: i32) -> Option<usize> {
        self.index
            .get_or_init(|| {
                let mut map = HashMap::with_capacity(self.ids.len());
                for (i, id) in self.ids.iter().enumerate() {
                    map.entry(*id).or_insert(i);
                }
                map
            })
            .get(&id)
            .copied()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.index(id).is_some()
    }

    pub fn set_ids(&mut self, ids: Vec<i32>) {
        self.ids = ids;
        self.index = OnceLock::new();
    }

    pub fn push(&mut self, id: i32) {
        if let Some(map) = self.index.get_mut() {
            map.entry(id).or_insert(self.ids.len());
        }
        self.ids.push(id);
    }

    /// Contiguous sub-scoping of at most `len` ids starting at `start`.
    pub fn slice(&self, start: usize, len: usize) -> Scoping {
        let start = start.min(self.ids.len());
        let end = start.saturating_add(len).min(self.ids.len());
        Scoping::new(self.location.clone(), self.ids[start..end].to_vec())
    }

    pub fn into_ids(self) -> Vec<i32> {
        self.ids
    }
}

impl PartialEq for Scoping {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && self.ids == other.ids
    }
}

impl From<Vec<i32>> for Scoping {
    fn from(ids: Vec<i32>) -> Self {
        Scoping::nodal(ids)
    }
}
