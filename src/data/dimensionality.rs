// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nature {
    Scalar,
    Vector,
    SymmetricMatrix,
    Matrix,
}

/// Nature and shape of the per-entity payload of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensionality {
    pub nature: Nature,
    pub shape: Vec<usize>,
}

impl Dimensionality {
    pub fn scalar() -> Self {
        Self {
            nature: Nature::Scalar,
            shape: vec![1],
        }
    }

    pub fn vector(n: usize) -> Self {
        Self {
            nature: Nature::Vector,
            shape: vec![n],
        }
    }

    pub fn vector_3d() -> Self {
        Self::vector(3)
    }

    /// `n` by `n` symmetric tensor stored as its upper triangle.
    pub fn symmetric_matrix(n: usize) -> Self {
        Self {
            nature: Nature::SymmetricMatrix,
            shape: vec![n, n],
        }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            nature: Nature::Matrix,
            shape: vec![rows, cols],
        }
    }

    pub fn rank(&self) -> usize {
        match self.nature {
            Nature::Scalar => 0,
            Nature::Vector => 1,
            Nature::SymmetricMatrix | Nature::Matrix => 2,
        }
    }

    /// Number of doubles stored per entity.
    pub fn component_count(&self) -> usize {
        match self.nature {
            Nature::Scalar => 1,
            Nature::Vector => self.shape.first().copied().unwrap_or(1),
            Nature::SymmetricMatrix => {
                let n = self.shape.first().copied().unwrap_or(0);
                n * (n + 1) / 2
            }
            Nature::Matrix => self.shape.iter().product(),
        }
    }
}

impl Default for Dimensionality {
    fn default() -> Self {
        Self::scalar()
    }
}

impl Display for Dimensionality {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let shape: Vec<String> = self.shape.iter().map(usize::to_string).collect();
        write!(f, "{:?}[{}]", self.nature, shape.join("x"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_counts() {
        assert_eq!(Dimensionality::scalar().component_count(), 1);
        assert_eq!(Dimensionality::vector_3d().component_count(), 3);
        assert_eq!(Dimensionality::symmetric_matrix(3).component_count(), 6);
        assert_eq!(Dimensionality::matrix(2, 4).component_count(), 8);
    }

    #[test]
    fn test_rank() {
        assert_eq!(Dimensionality::scalar().rank(), 0);
        assert_eq!(Dimensionality::vector(2).rank(), 1);
        assert_eq!(Dimensionality::matrix(3, 3).rank(), 2);
    }
}
