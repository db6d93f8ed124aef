// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed data exchanged between clients and the backend engine.
//!
//! Everything here is plain, serializable data. A value lives either on the
//! client (built locally, then shipped as a pin constant) or on the backend,
//! where the client reaches it through a [`crate::remote::Remote`] handle.
//!
//! * [`Value`] is the closed sum type that crosses every boundary ("Any").
//! * [`TypeSet`] is the bitmask of [`ValueType`]s a pin accepts.
//! * [`Scoping`], [`Field`], [`PropertyField`], [`StringField`],
//!   [`MeshedRegion`] and [`TimeFreqSupport`] are the scientific payloads.
//! * [`Collection`] tags entries with a [`LabelSpace`];
//!   [`GenericDataContainer`] maps property names to values.

pub(crate) mod bytes;
mod collection;
mod container;
mod dimensionality;
mod field;
mod label_space;
mod location;
mod mesh;
mod scoping;
mod time_freq;
mod types;
mod value;

pub use collection::Collection;
pub use container::GenericDataContainer;
pub use dimensionality::{Dimensionality, Nature};
pub use field::{Field, PropertyField, StringField};
pub use label_space::LabelSpace;
pub use location::Location;
pub use mesh::{MeshedRegion, MeshedRegionBuilder};
pub use scoping::Scoping;
pub use time_freq::TimeFreqSupport;
pub use types::{TypeSet, ValueType};
pub use value::{DataType, ObjectId, Value};
