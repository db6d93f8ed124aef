// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// What kind of entity the ids of a scoping refer to.
///
/// The set is open: backends and plug-ins may use their own tags, which
/// survive as [`Location::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Location {
    #[default]
    Nodal,
    Elemental,
    ElementalNodal,
    Faces,
    TimeFreq,
    Overall,
    Modal,
    Zone,
    Part,
    Interface,
    IdType,
    Custom(String),
}

impl Location {
    pub fn as_str(&self) -> &str {
        match self {
            Location::Nodal => "nodal",
            Location::Elemental => "elemental",
            Location::ElementalNodal => "elemental_nodal",
            Location::Faces => "faces",
            Location::TimeFreq => "time_freq",
            Location::Overall => "overall",
            Location::Modal => "modal",
            Location::Zone => "zone",
            Location::Part => "part",
            Location::Interface => "interface",
            Location::IdType => "idtype",
            Location::Custom(name) => name,
        }
    }
}

impl FromStr for Location {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Infallible> {
        Ok(match s {
            "nodal" => Location::Nodal,
            "elemental" => Location::Elemental,
            "elemental_nodal" => Location::ElementalNodal,
            "faces" => Location::Faces,
            "time_freq" => Location::TimeFreq,
            "overall" => Location::Overall,
            "modal" => Location::Modal,
            "zone" => Location::Zone,
            "part" => Location::Part,
            "interface" => Location::Interface,
            "idtype" => Location::IdType,
            other => Location::Custom(other.to_string()),
        })
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(location) => location,
            Err(never) => match never {},
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Location::from(tag.as_str()))
    }
}
