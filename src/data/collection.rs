// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Labeled bags of entries (fields containers, scopings containers, ...).

use super::{LabelSpace, Location, Scoping};
use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry<T> {
    label_space: LabelSpace,
    value: T,
}

/// Entries tagged with a [`LabelSpace`] over a declared set of labels.
///
/// The label set may grow only while the collection is empty. Lookups keep
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection<T> {
    labels: Vec<String>,
    entries: Vec<Entry<T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> Collection<T> {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collection = Self::default();
        for label in labels {
            let label = label.into();
            if !collection.labels.contains(&label) {
                collection.labels.push(label);
            }
        }
        collection
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn add_label(&mut self, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        if self.has_label(&label) {
            return Ok(());
        }
        if !self.entries.is_empty() {
            return Err(DpfError::invalid_argument(format!(
                "cannot add label '{label}': the label set is fixed once entries exist"
            )));
        }
        self.labels.push(label);
        Ok(())
    }

    fn check_labels(&self, label_space: &LabelSpace) -> Result<()> {
        match label_space.labels().find(|l| !self.has_label(l)) {
            Some(unknown) => Err(DpfError::invalid_argument(format!(
                "unknown label '{unknown}', collection labels are [{}]",
                self.labels.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Add `value` under `label_space`, replacing an entry with the same
    /// label space. An empty collection without labels adopts those of the
    /// first entry.
    pub fn add_entry(&mut self, label_space: LabelSpace, value: T) -> Result<()> {
        if label_space.is_empty() {
            return Err(DpfError::invalid_argument("label space of an entry cannot be empty"));
        }
        if self.labels.is_empty() && self.entries.is_empty() {
            self.labels = label_space.labels().map(str::to_string).collect();
        }
        self.check_labels(&label_space)?;
        match self.entries.iter_mut().find(|e| e.label_space == label_space) {
            Some(existing) => existing.value = value,
            None => self.entries.push(Entry { label_space, value }),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).map(|e| &mut e.value)
    }

    pub fn label_space(&self, index: usize) -> Option<&LabelSpace> {
        self.entries.get(index).map(|e| &e.label_space)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LabelSpace, &T)> {
        self.entries.iter().map(|e| (&e.label_space, &e.value))
    }

    /// Positions of every entry whose label space contains `partial`.
    pub fn indices_matching(&self, partial: &LabelSpace) -> Result<Vec<usize>> {
        self.check_labels(partial)?;
        Ok(self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.label_space.matches(partial))
            .map(|(i, _)| i)
            .collect())
    }

    pub fn get_entries(&self, partial: &LabelSpace) -> Result<Vec<&T>> {
        Ok(self
            .indices_matching(partial)?
            .into_iter()
            .map(|i| &self.entries[i].value)
            .collect())
    }

    /// Position of the single entry matching `label_space`.
    pub fn index_of(&self, label_space: &LabelSpace) -> Result<usize> {
        let matches = self.indices_matching(label_space)?;
        match matches.as_slice() {
            [index] => Ok(*index),
            [] => Err(DpfError::invalid_argument(format!(
                "no entry matches {label_space}"
            ))),
            _ => Err(DpfError::invalid_argument(format!(
                "{} entries match {label_space}, expected exactly one",
                matches.len()
            ))),
        }
    }

    pub fn get_entry(&self, label_space: &LabelSpace) -> Result<&T> {
        let index = self.index_of(label_space)?;
        Ok(&self.entries[index].value)
    }

    /// Distinct values taken by `label`, in order of first appearance.
    pub fn get_available_ids_for_label(&self, label: &str) -> Result<Scoping> {
        if !self.has_label(label) {
            return Err(DpfError::invalid_argument(format!("unknown label '{label}'")));
        }
        let mut ids = Scoping::new(Location::from(label), Vec::new());
        for entry in &self.entries {
            if let Some(value) = entry.label_space.get(label) {
                if !ids.contains(value) {
                    ids.push(value);
                }
            }
        }
        Ok(ids)
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> Result<U>) -> Result<Collection<U>> {
        let entries = self
            .entries
            .into_iter()
            .map(|e| {
                Ok(Entry {
                    label_space: e.label_space,
                    value: f(e.value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Collection {
            labels: self.labels,
            entries,
        })
    }

    pub fn into_entries(self) -> impl Iterator<Item = (LabelSpace, T)> {
        self.entries.into_iter().map(|e| (e.label_space, e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Field;
    use crate::errors::ErrorKind;

    fn field(v: f64) -> Field {
        Field::scalar(Scoping::nodal(vec![1]), vec![v]).unwrap()
    }

    fn time_body() -> Collection<Field> {
        let mut c = Collection::new(["time", "body"]);
        c.add_entry(LabelSpace::from([("time", 1), ("body", 10)]), field(1.0)).unwrap();
        c.add_entry(LabelSpace::from([("time", 1), ("body", 20)]), field(2.0)).unwrap();
        c.add_entry(LabelSpace::from([("time", 2), ("body", 10)]), field(3.0)).unwrap();
        c
    }

    #[test]
    fn test_partial_queries_keep_insertion_order() {
        let c = time_body();
        let by_time = c.get_entries(&LabelSpace::from([("time", 1)])).unwrap();
        assert_eq!(by_time, vec![&field(1.0), &field(2.0)]);

        let by_body = c.get_entries(&LabelSpace::from([("body", 10)])).unwrap();
        assert_eq!(by_body, vec![&field(1.0), &field(3.0)]);

        let exact = c.get_entry(&LabelSpace::from([("time", 2), ("body", 10)])).unwrap();
        assert_eq!(exact, &field(3.0));
    }

    #[test]
    fn test_every_entry_found_by_its_label_space() {
        let c = time_body();
        for (ls, value) in c.iter() {
            assert_eq!(c.get_entry(ls).unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_label_fails() {
        let c = time_body();
        let err = c.get_entries(&LabelSpace::from([("complex", 0)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let mut c = c;
        assert!(c
            .add_entry(LabelSpace::from([("time", 3), ("zone", 1)]), field(4.0))
            .is_err());
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_label_set_fixed_once_entries_exist() {
        let mut c: Collection<Field> = Collection::new(["time"]);
        c.add_label("body").unwrap();
        c.add_entry(LabelSpace::from([("time", 1)]), field(0.0)).unwrap();
        assert!(c.add_label("complex").is_err());
        assert!(c.add_label("body").is_ok());
    }

    #[test]
    fn test_ambiguous_get_entry_fails() {
        let c = time_body();
        let err = c.get_entry(&LabelSpace::from([("time", 1)])).unwrap_err();
        assert!(err.message.contains("2 entries match"));
        assert!(c.get_entry(&LabelSpace::from([("time", 9)])).is_err());
    }

    #[test]
    fn test_same_label_space_replaces_entry() {
        let mut c = time_body();
        c.add_entry(LabelSpace::from([("time", 1), ("body", 10)]), field(9.0)).unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c.get(0), Some(&field(9.0)));
    }

    #[test]
    fn test_available_ids_for_label() {
        let c = time_body();
        assert_eq!(c.get_available_ids_for_label("body").unwrap().ids(), &[10, 20]);
        assert_eq!(c.get_available_ids_for_label("time").unwrap().ids(), &[1, 2]);
        assert!(c.get_available_ids_for_label("zone").is_err());
    }

    #[test]
    fn test_first_entry_declares_labels() {
        let mut c: Collection<i32> = Collection::default();
        c.add_entry(LabelSpace::from([("time", 1)]), 5).unwrap();
        assert_eq!(c.labels(), &["time".to_string()]);
    }
}
