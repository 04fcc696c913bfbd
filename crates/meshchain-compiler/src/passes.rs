//! Passes over the assembled graph: cycle detection, splitter flattening,
//! and pruning of unreachable nodes and unused targets.

use std::collections::HashSet;

use tracing::trace;

use meshchain_config::normalize_split_weight;

use crate::compiler::Compiler;
use crate::error::{ChainError, ChainResult};
use crate::graph::{DiscoveryGraphNode, DiscoverySplit};
use crate::stack::StringStack;

/// Marks the point where a node's children are done and it leaves the path.
const POP_VISIT: &str = "_popvisit";

impl Compiler<'_> {
    /// Depth-first walk from the start node; any node reached again while
    /// still on the current path is a cycle.
    pub(crate) fn detect_circular_references(&self) -> ChainResult<()> {
        let mut todo = StringStack::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut visit_chain = StringStack::new();

        todo.push(self.start_node.clone());
        while let Some(current) = todo.pop() {
            if current == POP_VISIT {
                if let Some(done) = visit_chain.pop() {
                    visited.remove(&done);
                }
                continue;
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| ChainError::Internal(format!("unable to find node {current:?}")))?;

            if visited.contains(&current) {
                let mut path = visit_chain.items().to_vec();
                path.push(current);
                return Err(ChainError::graph(format!(
                    "detected circular reference: [{}]",
                    path.join(" -> ")
                )));
            }

            visited.insert(current.clone());
            visit_chain.push(current);
            todo.push(POP_VISIT);
            for next in node.next_nodes() {
                todo.push(next);
            }
        }

        Ok(())
    }

    /// Replace every split that points at another splitter with that
    /// splitter's splits, scaled by the outer weight. Repeats until no
    /// splitter points at a splitter.
    pub(crate) fn flatten_adjacent_splitter_nodes(&mut self) -> ChainResult<()> {
        loop {
            let splitter_keys: Vec<String> = self
                .nodes
                .iter()
                .filter(|(_, node)| matches!(node, DiscoveryGraphNode::Splitter(_)))
                .map(|(key, _)| key.clone())
                .collect();

            let mut any_changed = false;
            for key in splitter_keys {
                let Some(DiscoveryGraphNode::Splitter(node)) = self.nodes.get(&key) else {
                    continue;
                };

                let mut fixed = Vec::with_capacity(node.splits.len());
                let mut changed = false;
                for split in &node.splits {
                    let next = self.nodes.get(&split.next_node).ok_or_else(|| {
                        ChainError::Internal(format!("unable to find node {:?}", split.next_node))
                    })?;
                    let DiscoveryGraphNode::Splitter(inner) = next else {
                        fixed.push(split.clone());
                        continue;
                    };

                    changed = true;
                    for inner_split in &inner.splits {
                        let weight = split.weight * inner_split.weight / 100.0;
                        fixed.push(DiscoverySplit {
                            definition: inner_split.definition.merge_parent(&split.definition),
                            weight: normalize_split_weight(weight),
                            next_node: inner_split.next_node.clone(),
                        });
                    }
                }

                if changed {
                    trace!(splitter = %key, splits = fixed.len(), "flattened splitter");
                    if let Some(DiscoveryGraphNode::Splitter(node)) = self.nodes.get_mut(&key) {
                        node.splits = fixed;
                    }
                    any_changed = true;
                }
            }

            if !any_changed {
                return Ok(());
            }
        }
    }

    /// Drop nodes the start node cannot reach.
    pub(crate) fn remove_unused_nodes(&mut self) -> ChainResult<()> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut todo = vec![self.start_node.clone()];

        while let Some(current) = todo.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| ChainError::Internal(format!("unable to find node {current:?}")))?;
            todo.extend(node.next_nodes().into_iter().map(str::to_string));
        }

        if visited.len() != self.nodes.len() {
            self.nodes.retain(|key, _| {
                let keep = visited.contains(key);
                if !keep {
                    trace!(node = %key, "removed unreachable node");
                }
                keep
            });
        }

        Ok(())
    }

    /// Keep only targets that a resolver node or failover list uses.
    pub(crate) fn prune_targets(&mut self) {
        let retained = &self.retained_targets;
        self.loaded_targets.retain(|id, _| retained.contains(id));
    }
}
