// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{DpfError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Backend version, `major.minor`. Ordered so feature gates are comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for Version {
    type Err = DpfError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || DpfError::invalid_argument(format!("'{s}' is not a major.minor version"));
        let mut parts = s.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| bad())?,
            None => 0,
        };
        Ok(Version { major, minor })
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Minimum backend versions of gated features.
pub mod features {
    use super::Version;

    pub const FILE_TRANSFER: Version = Version::new(2, 0);
    pub const WORKFLOW_CHAINING: Version = Version::new(3, 0);
    pub const WORKFLOW_TOPOLOGY: Version = Version::new(8, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_order() {
        let v: Version = "8.1".parse().unwrap();
        assert_eq!(v, Version::new(8, 1));
        assert!(v >= features::WORKFLOW_TOPOLOGY);
        assert!("7.2".parse::<Version>().unwrap() < features::WORKFLOW_TOPOLOGY);
        assert_eq!("5".parse::<Version>().unwrap(), Version::new(5, 0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("eight".parse::<Version>().is_err());
        assert!("8.x".parse::<Version>().is_err());
    }
}
