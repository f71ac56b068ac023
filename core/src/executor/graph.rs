use std::collections::{HashMap, HashSet};

use crate::error::ExecutorError;
use crate::executor::types::TaskLike;

/// Task dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, T>,

    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Registration order, for stable stages
    insertion_order: Vec<String>,
}

impl<T: TaskLike> TaskGraph<T> {
    pub fn from_tasks(tasks: &[T]) -> Result<Self, ExecutorError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(ExecutorError::DuplicateTaskId(task.id().to_string()));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    /// Every dependency must be registered and the graph must be acyclic.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        for task_id in &self.insertion_order {
            for dep in self.edges.get(task_id).into_iter().flatten() {
                if !self.nodes.contains_key(dep) {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(ExecutorError::CircularDependency(cycle));
        }

        Ok(())
    }

    /// Kahn's algorithm. Tasks in one stage have no edges between them and
    /// may run concurrently; stages keep registration order.
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let mut in_degree: HashMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut stages: Vec<Vec<String>> = Vec::new();
        let mut current_stage: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()).copied() == Some(0))
            .cloned()
            .collect();

        let mut processed = 0;

        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut ready = HashSet::new();
            for task_id in &current_stage {
                for dependent in self.reverse_edges.get(task_id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }

            stages.push(current_stage);
            current_stage = self
                .insertion_order
                .iter()
                .filter(|id| ready.contains(id.as_str()))
                .cloned()
                .collect();
        }

        if processed != self.nodes.len() {
            return Err(ExecutorError::CircularDependency(
                "Unable to complete topological sort (cycle detected)".to_string(),
            ));
        }

        Ok(stages)
    }

    /// DFS cycle detection; returns the cycle as `a -> b -> a`.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}
