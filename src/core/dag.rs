//! Task DAG (Directed Acyclic Graph) for explicit dependencies.
//!
//! Edges point from a dependency to the task that waits on it. The DAG only
//! holds caller-declared dependencies; tier ordering is a barrier applied by
//! the planner, not an edge.

use crate::core::task::{Task, TaskId};
use crate::error::PlanningError;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// The task dependency graph.
///
/// Node weights are task ids; node insertion order is the caller's input
/// order, which keeps every traversal deterministic.
pub struct TaskDAG {
    graph: DiGraph<TaskId, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Build the DAG for a task batch.
    ///
    /// # Errors
    /// - [`PlanningError::DuplicateTask`] when two tasks share an id
    /// - [`PlanningError::SelfDependency`] for a task listing itself
    /// - [`PlanningError::UnknownDependency`] for a dangling reference
    /// - [`PlanningError::Cycle`] when dependencies loop
    pub fn from_tasks(tasks: &[Task]) -> Result<Self, PlanningError> {
        let mut dag = Self::new();
        for task in tasks {
            if dag.contains_task(&task.id) {
                return Err(PlanningError::DuplicateTask(task.id.clone()));
            }
            dag.add_task(task.id.clone());
        }

        for task in tasks {
            for dep in &task.dependencies {
                dag.add_dependency(dep, &task.id)?;
            }
        }

        Ok(dag)
    }

    /// Add a task to the DAG.
    ///
    /// If the task already exists, returns the existing NodeIndex.
    pub fn add_task(&mut self, id: TaskId) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&id) {
            return index;
        }

        let index = self.graph.add_node(id.clone());
        self.task_index.insert(id, index);
        index
    }

    /// Record that `dependent` cannot start before `dependency` completes.
    ///
    /// The edge is rejected (and not kept) if it would close a cycle.
    pub fn add_dependency(
        &mut self,
        dependency: &TaskId,
        dependent: &TaskId,
    ) -> Result<(), PlanningError> {
        if dependency == dependent {
            return Err(PlanningError::SelfDependency {
                task: dependent.clone(),
            });
        }

        let to_index = *self
            .task_index
            .get(dependent)
            .ok_or_else(|| PlanningError::UnknownTask(dependent.clone()))?;

        let from_index = *self.task_index.get(dependency).ok_or_else(|| {
            PlanningError::UnknownDependency {
                task: dependent.clone(),
                dependency: dependency.clone(),
            }
        })?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(());
        }

        let edge = self.graph.add_edge(from_index, to_index, ());
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(PlanningError::Cycle {
                task: dependent.clone(),
            });
        }

        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Check if `dependent` directly depends on `dependency`.
    pub fn has_dependency(&self, dependency: &TaskId, dependent: &TaskId) -> bool {
        match (self.task_index.get(dependency), self.task_index.get(dependent)) {
            (Some(&from), Some(&to)) => self.graph.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Direct dependencies of a task (predecessors).
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that directly depend on the given task (successors).
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&TaskId> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<(NodeIndex, &TaskId)> = self
            .graph
            .neighbors_directed(index, direction)
            .filter_map(|n| self.graph.node_weight(n).map(|w| (n, w)))
            .collect();
        // petgraph yields neighbours newest-edge first; report in input order.
        found.sort_by_key(|(n, _)| n.index());
        found.into_iter().map(|(_, w)| w).collect()
    }

    /// Task ids in dependency order.
    pub fn topological_order(&self) -> Result<Vec<&TaskId>, PlanningError> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let task = self
                .graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_else(|| TaskId::new("unknown"));
            PlanningError::Cycle { task }
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
