//! Task graphs.
//!
//! A [`Graph`] is the ordered owning container of nodes; everything else in
//! the engine holds non-owning references into it. Graphs nest: a subflow
//! node owns an inner graph, a module node references an external one.

pub(crate) mod flow;
pub(crate) mod node;

use std::sync::{Arc, Weak};

use weft_core::types::{TaskParams, TaskType};

use node::{Node, Work};

/// Ordered owning container of task nodes. Move-only.
pub(crate) struct Graph {
    nodes: Vec<Arc<Node>>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    /// Constructs a node and appends it, preserving insertion order.
    pub(crate) fn emplace(&mut self, params: TaskParams, work: Work) -> Arc<Node> {
        let node = Arc::new(Node::new(params, work));
        self.nodes.push(Arc::clone(&node));
        node
    }

    /// Stable removal of one node, unlinking it from its neighbours.
    pub(crate) fn erase(&mut self, node: &Arc<Node>) {
        let successors: Vec<Arc<Node>> = node.successors.lock().clone();
        for s in &successors {
            node.unlink(s);
        }
        let dependents: Vec<Arc<Node>> = node
            .dependents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for d in &dependents {
            d.unlink(node);
        }
        self.nodes.retain(|n| !Arc::ptr_eq(n, node));
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Drops all nodes, dismantling edge lists and nested subgraphs first.
    pub(crate) fn clear(&mut self) {
        let mut worklist = std::mem::take(&mut self.nodes);
        // Hoist nested subflow graphs into the worklist instead of letting
        // their drops recurse; deeply nested subflows would otherwise
        // overflow the stack.
        let mut i = 0;
        while i < worklist.len() {
            let node = Arc::clone(&worklist[i]);
            if node.task_type() == TaskType::Subflow {
                if let Work::Subflow { subgraph, .. } = &mut *node.work.lock() {
                    worklist.append(&mut subgraph.nodes);
                }
            }
            // Forward edges are strong; conditional loops make them cyclic.
            node.successors.lock().clear();
            node.dependents.lock().clear();
            i += 1;
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        self.clear();
    }
}
