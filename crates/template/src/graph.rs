// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency DAG over template steps.
//!
//! Cycle detection goes through petgraph; the execution order is a Kahn
//! walk over the template's `IndexMap` so ties between independent steps
//! always resolve to declaration order.

use crate::model::PipelineTemplate;
use petgraph::graph::DiGraph;
use petgraph::algo::tarjan_scc;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use writeit_core::StepKey;

/// Errors from ordering the dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepKey, dependency: StepKey },
    #[error("dependency cycle: {}", members.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" -> "))]
    Cycle { members: Vec<StepKey> },
}

/// Find a dependency cycle, if any. Unknown dependency targets are ignored
/// here (they are reported separately by the validator).
pub fn find_cycle(template: &PipelineTemplate) -> Option<Vec<StepKey>> {
    let mut graph = DiGraph::<&StepKey, ()>::new();
    let mut nodes = HashMap::new();
    for key in template.steps.keys() {
        nodes.insert(key, graph.add_node(key));
    }
    for (key, spec) in &template.steps {
        for dep in &spec.depends_on {
            if let (Some(&from), Some(&to)) = (nodes.get(dep), nodes.get(key)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    for scc in tarjan_scc(&graph) {
        let is_cycle = scc.len() > 1
            || (scc.len() == 1 && graph.find_edge(scc[0], scc[0]).is_some());
        if is_cycle {
            let mut members: Vec<StepKey> =
                scc.iter().map(|&n| (*graph[n]).clone()).collect();
            // Deterministic reporting order
            members.sort();
            return Some(members);
        }
    }
    None
}

/// Topological execution order with ties broken by declaration order.
pub fn execution_order(template: &PipelineTemplate) -> Result<Vec<StepKey>, GraphError> {
    for (key, spec) in &template.steps {
        for dep in &spec.depends_on {
            if !template.steps.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    step: key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let total = template.steps.len();
    let mut emitted: HashSet<&StepKey> = HashSet::with_capacity(total);
    let mut order = Vec::with_capacity(total);

    while order.len() < total {
        let mut advanced = false;
        for (key, spec) in &template.steps {
            if emitted.contains(key) {
                continue;
            }
            if spec.depends_on.iter().all(|dep| emitted.contains(dep)) {
                emitted.insert(key);
                order.push(key.clone());
                advanced = true;
            }
        }
        if !advanced {
            let members = find_cycle(template).unwrap_or_else(|| {
                template
                    .steps
                    .keys()
                    .filter(|k| !emitted.contains(k))
                    .cloned()
                    .collect()
            });
            return Err(GraphError::Cycle { members });
        }
    }

    Ok(order)
}

/// The transitive dependency closure of `key` (excluding `key` itself).
///
/// Used for the variable-closure check: a prompt may only reference the
/// outputs of steps it (transitively) depends on.
pub fn transitive_dependencies(template: &PipelineTemplate, key: &StepKey) -> BTreeSet<StepKey> {
    let mut closure = BTreeSet::new();
    let mut stack: Vec<&StepKey> = match template.steps.get(key) {
        Some(spec) => spec.depends_on.iter().collect(),
        None => return closure,
    };
    while let Some(dep) = stack.pop() {
        if closure.insert(dep.clone()) {
            if let Some(spec) = template.steps.get(dep) {
                stack.extend(spec.depends_on.iter());
            }
        }
    }
    closure
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
