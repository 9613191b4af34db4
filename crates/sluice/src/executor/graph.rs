/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Topology helpers for DAG nodes and pipeline steps.
//!
//! The batch partition computed here is deterministic given the input DAG:
//! a node's batch index is the length of its longest dependency chain, and
//! nodes inside a batch are ordered by id ascending. Step ordering for
//! pipelines is a depth-first topological sort in declaration order, so a
//! valid declaration order is preserved.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::Graph;

use crate::error::ExecutorError;
use crate::models::{DagNode, PipelineStep};

/// Partitions a DAG into dependency-closed batches.
///
/// Batch 0 holds the nodes with no dependencies; batch *k*+1 holds the
/// nodes whose dependencies all live in batches 0..=*k*. Every node
/// appears in exactly one batch, and the number of batches equals the
/// longest dependency chain length.
pub fn execution_batches(dag: &[DagNode]) -> Result<Vec<Vec<&DagNode>>, ExecutorError> {
    if dag.is_empty() {
        return Ok(Vec::new());
    }

    let mut indices = HashMap::with_capacity(dag.len());
    let mut graph = Graph::<&str, ()>::with_capacity(dag.len(), dag.len());
    for node in dag {
        if indices.insert(node.id.as_str(), graph.add_node(node.id.as_str())).is_some() {
            return Err(ExecutorError::InvalidDag(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    for node in dag {
        for dep in &node.depends_on {
            let Some(&dep_index) = indices.get(dep.as_str()) else {
                return Err(ExecutorError::InvalidDag(format!(
                    "node '{}' depends on unknown node '{}'",
                    node.id, dep
                )));
            };
            graph.add_edge(dep_index, indices[node.id.as_str()], ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        ExecutorError::InvalidDag(format!(
            "circular dependency detected at node '{}'",
            graph[cycle.node_id()]
        ))
    })?;

    // Depth = longest dependency chain ending at the node; computed in
    // topological order so dependency depths are always available.
    let node_map: HashMap<&str, &DagNode> = dag.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut depths: HashMap<&str, usize> = HashMap::with_capacity(dag.len());
    for index in order {
        let id = graph[index];
        let node = node_map[id];
        let depth = node
            .depends_on
            .iter()
            .map(|dep| depths[dep.as_str()] + 1)
            .max()
            .unwrap_or(0);
        depths.insert(id, depth);
    }

    let mut batches: BTreeMap<usize, Vec<&DagNode>> = BTreeMap::new();
    for node in dag {
        batches
            .entry(depths[node.id.as_str()])
            .or_default()
            .push(node);
    }

    Ok(batches
        .into_values()
        .map(|mut batch| {
            batch.sort_by(|a, b| a.id.cmp(&b.id));
            batch
        })
        .collect())
}

/// Orders pipeline steps so every step runs after the step producing its
/// input.
///
/// A step depends on the sibling whose `id` or `output` matches its
/// declared `input`. Steps without an input declaration depend on nothing.
/// Inputs that match no sibling resolve at runtime against the variable
/// environment instead.
pub fn sort_steps(steps: &[PipelineStep]) -> Result<Vec<&PipelineStep>, ExecutorError> {
    let index_of: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    if index_of.len() != steps.len() {
        return Err(ExecutorError::InvalidPipeline(
            "duplicate step id".to_string(),
        ));
    }

    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        let Some(input) = &step.input else { continue };
        if let Some(&producer) = index_of.get(input.as_str()) {
            dependencies[i].push(producer);
        }
        for (j, other) in steps.iter().enumerate() {
            if other.output.as_deref() == Some(input.as_str()) && !dependencies[i].contains(&j) {
                dependencies[i].push(j);
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        index: usize,
        steps: &[PipelineStep],
        dependencies: &[Vec<usize>],
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), ExecutorError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(ExecutorError::InvalidPipeline(format!(
                    "circular dependency detected at step '{}'",
                    steps[index].id
                )))
            }
            Mark::Unvisited => {}
        }

        marks[index] = Mark::InProgress;
        for &dep in &dependencies[index] {
            if dep != index {
                visit(dep, steps, dependencies, marks, order)?;
            } else {
                return Err(ExecutorError::InvalidPipeline(format!(
                    "circular dependency detected at step '{}'",
                    steps[index].id
                )));
            }
        }
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; steps.len()];
    let mut order = Vec::with_capacity(steps.len());
    for index in 0..steps.len() {
        visit(index, steps, &dependencies, &mut marks, &mut order)?;
    }

    Ok(order.into_iter().map(|i| &steps[i]).collect())
}
