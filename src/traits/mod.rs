// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backend;
pub mod operator;

pub use backend::{Backend, Transport};
pub use operator::{GraphAccess, OperatorContext, OperatorImpl, Outputs};
