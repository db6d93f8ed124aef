// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::data::TypeSet;
use crate::errors::Result;
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};

/// Copies every connected input pin to the output pin of the same number.
#[derive(Debug, Default)]
pub struct ForwardOperator;

impl OperatorImpl for ForwardOperator {
    fn specification(&self) -> Specification {
        Specification::new("Returns all the inputs as outputs, pin for pin.")
            .input(0, PinSpec::required("any", TypeSet::ANY, "value to forward").ellipsis())
            .output(0, PinSpec::required("any", TypeSet::ANY, "forwarded value").ellipsis())
            .category("utility")
            .scripting_name("forward")
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        Ok(ctx
            .inputs_from(0)
            .map(|(pin, value)| (pin, value.clone()))
            .collect())
    }
}
