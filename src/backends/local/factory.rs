// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::operators::*;
use crate::protocol::{features, Version};
use crate::traits::OperatorImpl;

/// Names of the built-in operators, in registration order.
const BUILTINS: &[&str] = &[
    "forward",
    "add",
    "scale",
    "min_max",
    "min_max_inc",
    "min_max_fc",
    "min_max_fc_inc",
    "accumulate",
    "scoping::to_field",
    "scoping::intersect",
    "scoping::union",
    "rescope",
    "chunk_in_for_each_range",
    "for_each",
    "workflow_topology",
];

/// Factory for the operators compiled into the engine.
pub struct LocalOperatorFactory;

impl LocalOperatorFactory {
    /// Create a built-in operator by name.
    ///
    /// - "forward" -> ForwardOperator
    /// - "add", "scale" -> arithmetic on fields and fields containers
    /// - "min_max", "min_max_fc" and their "_inc" variants -> extremes
    /// - "accumulate" -> component sums, incremental on request
    /// - "scoping::to_field", "scoping::intersect", "scoping::union", "rescope"
    /// - "chunk_in_for_each_range", "for_each" -> chunked evaluation
    /// - "workflow_topology" -> only from engine version 8.0
    pub fn create_operator(name: &str, version: Version) -> Option<Arc<dyn OperatorImpl>> {
        let operator: Arc<dyn OperatorImpl> = match name {
            "forward" => Arc::new(ForwardOperator),
            "add" => Arc::new(AddOperator),
            "scale" => Arc::new(ScaleOperator),
            "min_max" => Arc::new(MinMaxOperator::one_shot()),
            "min_max_inc" => Arc::new(MinMaxOperator::incremental()),
            "min_max_fc" => Arc::new(MinMaxFcOperator::one_shot()),
            "min_max_fc_inc" => Arc::new(MinMaxFcOperator::incremental()),
            "accumulate" => Arc::new(AccumulateOperator),
            "scoping::to_field" => Arc::new(ScopingToFieldOperator),
            "scoping::intersect" => Arc::new(IntersectOperator),
            "scoping::union" => Arc::new(UnionOperator),
            "rescope" => Arc::new(RescopeOperator),
            "chunk_in_for_each_range" => Arc::new(ChunkInForEachRangeOperator),
            "for_each" => Arc::new(ForEachOperator),
            "workflow_topology" if version >= features::WORKFLOW_TOPOLOGY => {
                Arc::new(WorkflowTopologyOperator)
            }
            _ => return None,
        };
        Some(operator)
    }

    /// Whether `name` is compiled into every engine, as opposed to coming
    /// from a plug-in that only some sessions have loaded.
    pub fn is_builtin(name: &str) -> bool {
        BUILTINS.contains(&name)
    }

    /// Every built-in available at `version`.
    pub fn builtins(version: Version) -> Vec<(&'static str, Arc<dyn OperatorImpl>)> {
        BUILTINS
            .iter()
            .filter_map(|name| Self::create_operator(name, version).map(|op| (*name, op)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_is_gated_by_version() {
        let recent = LocalOperatorFactory::builtins(Version::new(9, 0));
        let old = LocalOperatorFactory::builtins(Version::new(7, 1));
        assert!(recent.iter().any(|(name, _)| *name == "workflow_topology"));
        assert!(!old.iter().any(|(name, _)| *name == "workflow_topology"));
        assert_eq!(recent.len(), old.len() + 1);
    }

    #[test]
    fn test_unknown_name() {
        assert!(LocalOperatorFactory::create_operator("mapdl::rst::U", Version::new(9, 0)).is_none());
    }

    #[test]
    fn test_every_builtin_has_outputs() {
        for (name, op) in LocalOperatorFactory::builtins(Version::new(9, 0)) {
            assert!(!op.specification().outputs.is_empty(), "{name} has no outputs");
        }
    }
}
