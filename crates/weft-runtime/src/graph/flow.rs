//! User-facing graph construction surface.
//!
//! A [`Flow`] owns one task graph and exposes the builder operations; a
//! [`Task`] is a cheap cloneable handle to one vertex; a [`SubflowBuilder`]
//! is the same builder surface bound to the inner graph of a subflow node
//! while it executes.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_core::types::{TaskParams, TaskType};

use crate::graph::node::{Node, StaticWork, Work};
use crate::graph::Graph;
use crate::runtime::Runtime;

/// A named, user-owned task graph.
pub struct Flow {
    name: String,
    graph: Arc<Mutex<Graph>>,
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow {
    /// Creates an empty unnamed flow.
    pub fn new() -> Self {
        Flow {
            name: String::new(),
            graph: Arc::new(Mutex::new(Graph::new())),
        }
    }

    /// Creates an empty named flow.
    pub fn named(name: impl Into<String>) -> Self {
        Flow {
            name: name.into(),
            graph: Arc::new(Mutex::new(Graph::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_tasks(&self) -> usize {
        self.graph.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.lock().is_empty()
    }

    /// Adds a sequential work item.
    pub fn emplace<F>(&mut self, f: F) -> Task
    where
        F: FnMut() + Send + 'static,
    {
        self.add(Work::Static(StaticWork::Plain(Box::new(f))))
    }

    /// Adds a sequential work item that receives the runtime token.
    pub fn emplace_runtime<F>(&mut self, f: F) -> Task
    where
        F: FnMut(&mut Runtime<'_>) + Send + 'static,
    {
        self.add(Work::Static(StaticWork::WithRuntime(Box::new(f))))
    }

    /// Adds a task that builds a nested graph at run time.
    pub fn emplace_subflow<F>(&mut self, f: F) -> Task
    where
        F: FnMut(&mut SubflowBuilder<'_>) + Send + 'static,
    {
        self.add(Work::Subflow {
            build: Box::new(f),
            subgraph: Graph::new(),
        })
    }

    /// Adds a task that selects exactly one successor to release.
    pub fn emplace_condition<F>(&mut self, f: F) -> Task
    where
        F: FnMut() -> usize + Send + 'static,
    {
        self.add(Work::Condition(Box::new(f)))
    }

    /// Adds a task that selects a set of successors to release.
    pub fn emplace_multi_condition<F>(&mut self, f: F) -> Task
    where
        F: FnMut() -> Vec<usize> + Send + 'static,
    {
        self.add(Work::MultiCondition(Box::new(f)))
    }

    /// Adds a pure dependency vertex.
    pub fn placeholder(&mut self) -> Task {
        self.add(Work::Placeholder)
    }

    /// Adds a task that executes `target`'s graph under itself.
    pub fn composed_of(&mut self, target: &Flow) -> Task {
        self.add(Work::Module {
            target: Arc::clone(&target.graph),
        })
    }

    /// Removes a task and all its edges.
    pub fn erase(&mut self, task: Task) {
        self.graph.lock().erase(&task.node);
    }

    fn add(&mut self, work: Work) -> Task {
        let node = self.graph.lock().emplace(TaskParams::default(), work);
        Task { node }
    }

    pub(crate) fn graph_arc(&self) -> Arc<Mutex<Graph>> {
        Arc::clone(&self.graph)
    }

    /// Snapshot of the node set, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Node>> {
        self.graph.lock().nodes().to_vec()
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("num_tasks", &self.num_tasks())
            .finish()
    }
}

/// Cloneable handle to one task vertex.
#[derive(Clone)]
pub struct Task {
    pub(crate) node: Arc<Node>,
}

impl Task {
    pub fn name(&self) -> String {
        self.node.name()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.node.name.lock() = name.into();
    }

    /// Names the task, chainable at creation.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// Attaches an opaque payload to the task.
    pub fn set_data(&self, data: Box<dyn Any + Send>) {
        *self.node.data.lock() = Some(data);
    }

    /// Runs `f` against the task's payload, if any.
    pub fn with_data<R>(&self, f: impl FnOnce(Option<&mut (dyn Any + Send)>) -> R) -> R {
        let mut guard = self.node.data.lock();
        f(guard.as_deref_mut())
    }

    pub fn task_type(&self) -> TaskType {
        self.node.task_type()
    }

    /// Declares that `self` must complete before each of `others`.
    pub fn precede(&self, others: &[&Task]) {
        for other in others {
            self.node.precede(&other.node);
        }
    }

    /// Declares that `self` starts only after each of `others`.
    pub fn succeed(&self, others: &[&Task]) {
        for other in others {
            other.node.precede(&self.node);
        }
    }

    pub fn num_successors(&self) -> usize {
        self.node.num_successors()
    }

    pub fn num_dependents(&self) -> usize {
        self.node.num_dependents()
    }

    pub fn num_strong_dependents(&self) -> usize {
        self.node.num_strong_dependents()
    }

    pub fn num_weak_dependents(&self) -> usize {
        self.node.num_weak_dependents()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("type", &self.task_type())
            .finish()
    }
}

/// Builder over the inner graph of an executing subflow node.
pub struct SubflowBuilder<'a> {
    pub(crate) graph: &'a mut Graph,
}

impl SubflowBuilder<'_> {
    /// Adds a sequential work item to the subflow.
    pub fn emplace<F>(&mut self, f: F) -> Task
    where
        F: FnMut() + Send + 'static,
    {
        self.add(Work::Static(StaticWork::Plain(Box::new(f))))
    }

    /// Adds a runtime-aware work item to the subflow.
    pub fn emplace_runtime<F>(&mut self, f: F) -> Task
    where
        F: FnMut(&mut Runtime<'_>) + Send + 'static,
    {
        self.add(Work::Static(StaticWork::WithRuntime(Box::new(f))))
    }

    /// Adds a nested subflow; recursion bottoms out when a builder adds none.
    pub fn emplace_subflow<F>(&mut self, f: F) -> Task
    where
        F: FnMut(&mut SubflowBuilder<'_>) + Send + 'static,
    {
        self.add(Work::Subflow {
            build: Box::new(f),
            subgraph: Graph::new(),
        })
    }

    /// Adds a condition task to the subflow.
    pub fn emplace_condition<F>(&mut self, f: F) -> Task
    where
        F: FnMut() -> usize + Send + 'static,
    {
        self.add(Work::Condition(Box::new(f)))
    }

    /// Adds a multi-condition task to the subflow.
    pub fn emplace_multi_condition<F>(&mut self, f: F) -> Task
    where
        F: FnMut() -> Vec<usize> + Send + 'static,
    {
        self.add(Work::MultiCondition(Box::new(f)))
    }

    /// Adds a pure dependency vertex to the subflow.
    pub fn placeholder(&mut self) -> Task {
        self.add(Work::Placeholder)
    }

    /// Composes an external flow under the subflow.
    pub fn composed_of(&mut self, target: &Flow) -> Task {
        self.add(Work::Module {
            target: target.graph_arc(),
        })
    }

    pub fn num_tasks(&self) -> usize {
        self.graph.len()
    }

    fn add(&mut self, work: Work) -> Task {
        let node = self.graph.emplace(TaskParams::default(), work);
        Task { node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_surface_and_introspection() {
        let mut flow = Flow::named("pipeline");
        let a = flow.emplace(|| {}).with_name("A");
        let b = flow.placeholder().with_name("B");
        let c = flow.emplace_condition(|| 0).with_name("C");
        a.precede(&[&b, &c]);
        c.precede(&[&b]);

        assert_eq!(flow.name(), "pipeline");
        assert_eq!(flow.num_tasks(), 3);
        assert_eq!(a.num_successors(), 2);
        assert_eq!(b.num_dependents(), 2);
        assert_eq!(b.num_strong_dependents(), 1);
        assert_eq!(b.num_weak_dependents(), 1);
        assert_eq!(c.task_type(), TaskType::Condition);
    }

    #[test]
    fn succeed_mirrors_precede() {
        let mut flow = Flow::new();
        let a = flow.emplace(|| {});
        let b = flow.emplace(|| {});
        b.succeed(&[&a]);
        assert_eq!(a.num_successors(), 1);
        assert_eq!(b.num_dependents(), 1);
    }

    #[test]
    fn erase_removes_task() {
        let mut flow = Flow::new();
        let a = flow.emplace(|| {});
        let b = flow.emplace(|| {});
        a.precede(&[&b]);
        flow.erase(b);
        assert_eq!(flow.num_tasks(), 1);
        assert_eq!(a.num_successors(), 0);
    }

    #[test]
    fn task_data_roundtrip() {
        let mut flow = Flow::new();
        let a = flow.emplace(|| {});
        a.set_data(Box::new(41_i32));
        let value = a.with_data(|data| {
            let data = data.expect("payload present");
            *data.downcast_mut::<i32>().unwrap() += 1;
            *data.downcast_ref::<i32>().unwrap()
        });
        assert_eq!(value, 42);
    }
}
