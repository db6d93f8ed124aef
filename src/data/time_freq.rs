// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Field, Location, Scoping};
use crate::errors::Result;
use serde::{Deserialize, Serialize};

/// Time or frequency coordinates of a result, one per set.
///
/// Set ids are 1-based, matching the cumulative indices solvers write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFreqSupport {
    time_frequencies: Field,
    complex_frequencies: Option<Field>,
    rpms: Option<Field>,
}

fn set_field(values: Vec<f64>, unit: &str) -> Result<Field> {
    let ids = (1..=values.len() as i32).collect();
    Ok(Field::scalar(Scoping::new(Location::TimeFreq, ids), values)?.with_unit(unit))
}

impl TimeFreqSupport {
    pub fn new(values: Vec<f64>, unit: &str) -> Result<Self> {
        Ok(Self {
            time_frequencies: set_field(values, unit)?,
            complex_frequencies: None,
            rpms: None,
        })
    }

    pub fn with_complex_frequencies(mut self, values: Vec<f64>, unit: &str) -> Result<Self> {
        self.complex_frequencies = Some(set_field(values, unit)?);
        Ok(self)
    }

    pub fn with_rpms(mut self, values: Vec<f64>) -> Result<Self> {
        self.rpms = Some(set_field(values, "rpm")?);
        Ok(self)
    }

    pub fn n_sets(&self) -> usize {
        self.time_frequencies.len()
    }

    pub fn time_frequencies(&self) -> &Field {
        &self.time_frequencies
    }

    pub fn complex_frequencies(&self) -> Option<&Field> {
        self.complex_frequencies.as_ref()
    }

    pub fn rpms(&self) -> Option<&Field> {
        self.rpms.as_ref()
    }

    pub fn set_ids(&self) -> &[i32] {
        self.time_frequencies.scoping().ids()
    }

    /// Coordinate of the 1-based `set`.
    pub fn get_frequency(&self, set: i32) -> Option<f64> {
        self.time_frequencies
            .get_entity_data_by_id(set)
            .and_then(|values| values.first().copied())
    }

    /// Set whose coordinate is closest to `value`.
    pub fn find_set(&self, value: f64) -> Option<i32> {
        let data = self.time_frequencies.data();
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in data.iter().enumerate() {
            let distance = (v - value).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        best.and_then(|(i, _)| self.time_frequencies.scoping().id(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_are_one_based() {
        let tfs = TimeFreqSupport::new(vec![0.1, 0.2, 0.5], "s").unwrap();
        assert_eq!(tfs.n_sets(), 3);
        assert_eq!(tfs.set_ids(), &[1, 2, 3]);
        assert_eq!(tfs.get_frequency(3), Some(0.5));
        assert_eq!(tfs.get_frequency(0), None);
        assert_eq!(tfs.time_frequencies().unit(), "s");
    }

    #[test]
    fn test_find_set_picks_nearest() {
        let tfs = TimeFreqSupport::new(vec![10.0, 20.0, 30.0], "Hz").unwrap();
        assert_eq!(tfs.find_set(21.0), Some(2));
        assert_eq!(tfs.find_set(100.0), Some(3));
    }

    #[test]
    fn test_optional_labels() {
        let tfs = TimeFreqSupport::new(vec![1.0, 2.0], "Hz")
            .unwrap()
            .with_rpms(vec![1500.0, 3000.0])
            .unwrap();
        assert_eq!(tfs.rpms().unwrap().data(), &[1500.0, 3000.0]);
        assert!(tfs.complex_frequencies().is_none());
    }
}
