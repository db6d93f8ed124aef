// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Label name to integer value, e.g. `{time: 3, body: 7}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSpace(BTreeMap<String, i32>);

impl LabelSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, value: i32) -> Self {
        self.0.insert(label.into(), value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: i32) -> Option<i32> {
        self.0.insert(label.into(), value)
    }

    pub fn get(&self, label: &str) -> Option<i32> {
        self.0.get(label).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every label of `partial` is present here with the same value.
    pub fn matches(&self, partial: &LabelSpace) -> bool {
        partial.iter().all(|(label, value)| self.get(label) == Some(value))
    }
}

impl<S: Into<String>, const N: usize> From<[(S, i32); N]> for LabelSpace {
    fn from(pairs: [(S, i32); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<(S, i32)> for LabelSpace {
    fn from_iter<I: IntoIterator<Item = (S, i32)>>(iter: I) -> Self {
        LabelSpace(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Display for LabelSpace {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_match() {
        let full = LabelSpace::from([("time", 1), ("body", 10)]);
        assert!(full.matches(&LabelSpace::from([("time", 1)])));
        assert!(full.matches(&LabelSpace::new()));
        assert!(!full.matches(&LabelSpace::from([("time", 2)])));
        assert!(!full.matches(&LabelSpace::from([("complex", 0)])));
    }

    #[test]
    fn test_display_is_sorted() {
        let ls = LabelSpace::new().with("time", 3).with("body", 7);
        assert_eq!(ls.to_string(), "{body: 7, time: 3}");
    }
}
