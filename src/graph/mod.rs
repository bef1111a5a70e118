//! Dependency graph
//!
//! Builds the node-and-edge model from descriptor dependency lists and keeps
//! the per-node count of prerequisites that have not completed yet. A fresh
//! graph is built for every run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::models::{TestCaseDescriptor, TestCaseId};

/// Errors that make the topology unusable
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("test '{test}' depends on unknown test '{dependency}'")]
    UnresolvedDependency {
        test: TestCaseId,
        dependency: TestCaseId,
    },

    #[error("duplicate test id '{0}'")]
    DuplicateTestId(TestCaseId),

    #[error("dependency cycle among tests: {}", join_ids(.members))]
    Cycle { members: Vec<TestCaseId> },
}

fn join_ids(ids: &[TestCaseId]) -> String {
    ids.iter()
        .map(TestCaseId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Edge from a node to one of its prerequisites
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependencyEdge {
    pub node: usize,
    pub proceed_on_failure: bool,
}

/// One test case in the graph
#[derive(Debug)]
pub struct Node {
    descriptor: Arc<TestCaseDescriptor>,
    dependencies: Vec<DependencyEdge>,
    dependents: Vec<usize>,
    remaining: usize,
    completed: bool,
}

impl Node {
    pub fn descriptor(&self) -> &Arc<TestCaseDescriptor> {
        &self.descriptor
    }

    /// Prerequisites of this node
    pub fn dependencies(&self) -> &[DependencyEdge] {
        &self.dependencies
    }

    /// Nodes that depend on this one
    pub fn dependents(&self) -> &[usize] {
        &self.dependents
    }

    /// Prerequisites not completed yet
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_ready(&self) -> bool {
        self.remaining == 0 && !self.completed
    }
}

/// Dependency graph over one run's descriptors
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<TestCaseId, usize>,
}

impl DependencyGraph {
    /// Build the graph, rejecting unknown dependencies, duplicate ids and cycles
    pub fn build(descriptors: Vec<TestCaseDescriptor>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTestId(descriptor.id.clone()));
            }
        }

        let mut nodes: Vec<Node> = descriptors
            .into_iter()
            .map(|descriptor| Node {
                descriptor: Arc::new(descriptor),
                dependencies: Vec::new(),
                dependents: Vec::new(),
                remaining: 0,
                completed: false,
            })
            .collect();

        for i in 0..nodes.len() {
            let descriptor = nodes[i].descriptor.clone();
            let mut seen = HashSet::new();

            for dependency in &descriptor.dependencies {
                let Some(&target) = index.get(&dependency.id) else {
                    return Err(GraphError::UnresolvedDependency {
                        test: descriptor.id.clone(),
                        dependency: dependency.id.clone(),
                    });
                };

                // Repeated mentions collapse into one edge; the first record wins
                if !seen.insert(target) {
                    continue;
                }

                nodes[i].dependencies.push(DependencyEdge {
                    node: target,
                    proceed_on_failure: dependency.proceed_on_failure,
                });
                nodes[i].remaining += 1;
                nodes[target].dependents.push(i);
            }
        }

        let graph = Self { nodes, index };
        graph.check_acyclic()?;

        debug!(
            "Built dependency graph: {} nodes, {} edges",
            graph.nodes.len(),
            graph.edge_count()
        );

        Ok(graph)
    }

    /// Kahn's algorithm on a scratch copy of the counters
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.remaining).collect();
        let mut queue: VecDeque<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == 0)
            .map(|(i, _)| i)
            .collect();
        let mut visited = 0;

        while let Some(i) = queue.pop_front() {
            visited += 1;
            for &dependent in &self.nodes[i].dependents {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited == self.nodes.len() {
            return Ok(());
        }

        let members = remaining
            .iter()
            .enumerate()
            .filter(|(_, r)| **r > 0)
            .map(|(i, _)| self.nodes[i].descriptor.id.clone())
            .collect();

        Err(GraphError::Cycle { members })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.dependencies.len()).sum()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn index_of(&self, id: &TestCaseId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Indices of nodes whose prerequisites have all completed, in input order
    pub fn ready_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_ready())
            .map(|(i, _)| i)
            .collect()
    }

    /// Mark a node complete and release its dependents.
    ///
    /// Returns the dependents whose counter reached zero. Completing a node
    /// twice is a no-op.
    pub fn mark_complete(&mut self, index: usize) -> Vec<usize> {
        if self.nodes[index].completed {
            return Vec::new();
        }
        self.nodes[index].completed = true;

        let dependents = self.nodes[index].dependents.clone();
        let mut released = Vec::new();
        for dependent in dependents {
            let node = &mut self.nodes[dependent];
            node.remaining = node.remaining.saturating_sub(1);
            if node.remaining == 0 {
                released.push(dependent);
            }
        }
        released
    }

    /// Number of nodes not completed yet
    pub fn pending(&self) -> usize {
        self.nodes.iter().filter(|n| !n.completed).count()
    }
}
