// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod factory;
pub mod operators;

pub use factory::LocalOperatorFactory;
pub use operators::*;
