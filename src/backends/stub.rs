// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::data::{TypeSet, Value};
use crate::errors::{DpfError, Result};
use crate::protocol::{PinSpec, Specification};
use crate::traits::{OperatorContext, OperatorImpl, Outputs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An operator that always fails, for error propagation tests
#[derive(Debug, Default)]
pub struct FailingOperator;

impl OperatorImpl for FailingOperator {
    fn specification(&self) -> Specification {
        Specification::new("Always fails.")
            .input(0, PinSpec::optional("any", TypeSet::ANY, ""))
            .output(0, PinSpec::required("nothing", TypeSet::ANY, ""))
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        Err(DpfError::evaluation_failed(ctx.name(), "Simulated operator failure"))
    }
}

/// Forwards pin 0 and counts how many times it ran
#[derive(Debug, Default, Clone)]
pub struct CountingOperator {
    pub runs: Arc<AtomicUsize>,
}

impl CountingOperator {
    pub fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl OperatorImpl for CountingOperator {
    fn specification(&self) -> Specification {
        Specification::new("Forwards its input and counts evaluations.")
            .input(0, PinSpec::required("value", TypeSet::ANY, ""))
            .output(0, PinSpec::required("value", TypeSet::ANY, ""))
    }

    fn run(&self, ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let value: Value = ctx
            .input(0)
            .cloned()
            .ok_or_else(|| DpfError::missing_input(ctx.name(), 0, "value"))?;
        Ok(Outputs::from([(0, value)]))
    }
}

/// Produces nothing on any pin, for missing-output tests
#[derive(Debug, Default)]
pub struct NoOutputOperator;

impl OperatorImpl for NoOutputOperator {
    fn specification(&self) -> Specification {
        Specification::new("Declares an output but never produces it.")
            .output(0, PinSpec::required("missing", TypeSet::ANY, ""))
    }

    fn run(&self, _ctx: &mut OperatorContext<'_>) -> Result<Outputs> {
        Ok(Outputs::new())
    }
}
