//! Graph builder and compiled plans.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};

use super::error::GraphError;
use super::task::{Task, TaskId};

/// Named collection of tasks under construction.
pub struct Graph<E> {
    name: String,
    tasks: Vec<Task<E>>,
}

impl<E> fmt::Debug for Graph<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl<E> Graph<E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a task and returns its id.
    pub fn add(&mut self, task: Task<E>) -> TaskId {
        self.tasks.push(task);
        TaskId(self.tasks.len() - 1)
    }

    /// Adds an edge after the fact; `task` waits for `dependency`.
    ///
    /// Unlike [`Task::depends_on`] this can close a cycle, which
    /// [`Self::compile`] reports.
    pub fn add_dependency(&mut self, task: TaskId, dependency: TaskId) {
        if let Some(entry) = self.tasks.get_mut(task.0) {
            entry.dependencies.push(dependency);
        }
    }

    /// Validates the graph and fixes its execution order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateTask`] when two tasks share a name,
    /// [`GraphError::UnknownDependency`] for ids from another graph and
    /// [`GraphError::Cycle`] when the edges form a cycle.
    pub fn compile(self) -> Result<Plan<E>, GraphError> {
        let mut seen = HashSet::new();
        let mut dag = DiGraph::<usize, ()>::with_capacity(self.tasks.len(), 0);
        for (index, task) in self.tasks.iter().enumerate() {
            if !seen.insert(task.name.as_str()) {
                return Err(GraphError::DuplicateTask {
                    flow: self.name.clone(),
                    task: task.name.clone(),
                });
            }
            dag.add_node(index);
        }

        for (index, task) in self.tasks.iter().enumerate() {
            for dependency in &task.dependencies {
                if dependency.0 >= self.tasks.len() {
                    return Err(GraphError::UnknownDependency {
                        flow: self.name.clone(),
                        task: task.name.clone(),
                    });
                }
                dag.update_edge(NodeIndex::new(dependency.0), NodeIndex::new(index), ());
            }
        }

        let order = algo::toposort(&dag, None).map_err(|cycle| GraphError::Cycle {
            flow: self.name.clone(),
            task: self
                .tasks
                .get(cycle.node_id().index())
                .map(|task| task.name.clone())
                .unwrap_or_default(),
        })?;

        let mut tasks = self.tasks;
        for task in &mut tasks {
            task.dependencies.sort_unstable();
            task.dependencies.dedup();
        }

        Ok(Plan {
            name: self.name,
            order: order.into_iter().map(NodeIndex::index).collect(),
            tasks,
        })
    }
}

/// Immutable, validated execution plan.
pub struct Plan<E> {
    pub(crate) name: String,
    pub(crate) order: Vec<usize>,
    pub(crate) tasks: Vec<Task<E>>,
}

impl<E> fmt::Debug for Plan<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.name)
            .field("tasks", &self.describe())
            .finish()
    }
}

/// Inspection view of one planned task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskDescription {
    /// Task name.
    pub name: String,
    /// Names of the tasks it waits for.
    pub dependencies: Vec<String>,
    /// Whether the task is skipped.
    pub skipped: bool,
    /// Task-specific timeout.
    pub timeout: Option<Duration>,
}

impl<E> Plan<E> {
    /// Plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of tasks, skipped ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` when the plan holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn task(&self, index: usize) -> Option<&Task<E>> {
        self.tasks.get(index)
    }

    /// Lists tasks in execution order without running anything.
    #[must_use]
    pub fn describe(&self) -> Vec<TaskDescription> {
        self.order
            .iter()
            .filter_map(|index| self.tasks.get(*index))
            .map(|task| TaskDescription {
                name: task.name.clone(),
                dependencies: task
                    .dependencies
                    .iter()
                    .filter_map(|id| self.tasks.get(id.0))
                    .map(|dependency| dependency.name.clone())
                    .collect(),
                skipped: task.skip,
                timeout: task.timeout,
            })
            .collect()
    }
}
