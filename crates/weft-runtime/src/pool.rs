//! Node recycling for the async task paths.
//!
//! Async tasks allocate one node per call; with the `task-pool` feature the
//! allocations are recycled through a thread-local cache backed by a global
//! freelist. Without the feature these helpers degrade to plain
//! allocate/drop.
//!
//! A node is only eligible for reuse when the recycler holds the sole
//! strong reference and no [`AnchorGuard`](crate::graph::node::AnchorGuard)
//! is active on it.

use std::sync::Arc;

use weft_core::types::TaskParams;

use crate::graph::node::{Node, Work};

#[cfg(feature = "task-pool")]
mod imp {
    use super::*;
    use parking_lot::Mutex;
    use std::cell::RefCell;
    use std::sync::atomic::Ordering;

    const LOCAL_CAP: usize = 64;
    const GLOBAL_CAP: usize = 1024;

    thread_local! {
        static LOCAL: RefCell<Vec<Arc<Node>>> = const { RefCell::new(Vec::new()) };
    }

    static GLOBAL: Mutex<Vec<Arc<Node>>> = Mutex::new(Vec::new());

    pub(super) fn animate(params: TaskParams, work: Work) -> Arc<Node> {
        let recycled = LOCAL
            .with(|local| local.borrow_mut().pop())
            .or_else(|| GLOBAL.lock().pop());
        match recycled {
            Some(node) => {
                reinitialize(&node, params, work);
                node
            }
            None => Arc::new(Node::new(params, work)),
        }
    }

    pub(super) fn recycle(node: Arc<Node>) {
        if Arc::strong_count(&node) != 1 || node.is_anchored() {
            return; // handles or anchors outstanding; drop normally
        }
        scrub(&node);
        let overflow = LOCAL.with(|local| {
            let mut local = local.borrow_mut();
            if local.len() < LOCAL_CAP {
                local.push(node);
                None
            } else {
                Some(node)
            }
        });
        if let Some(node) = overflow {
            let mut global = GLOBAL.lock();
            if global.len() < GLOBAL_CAP {
                global.push(node);
            }
        }
    }

    fn reinitialize(node: &Arc<Node>, params: TaskParams, work: Work) {
        *node.name.lock() = params.name;
        *node.data.lock() = params.data;
        *node.work.lock() = work;
    }

    fn scrub(node: &Arc<Node>) {
        // Drop closures and references eagerly; the node may sit in the
        // freelist for a while.
        *node.work.lock() = Work::Placeholder;
        *node.topology.lock() = None;
        *node.parent.lock() = std::sync::Weak::new();
        node.successors.lock().clear();
        node.dependents.lock().clear();
        *node.data.lock() = None;
        node.join_counter.store(0, Ordering::Relaxed);
        node.strong_in.store(0, Ordering::Relaxed);
        node.cond_in.store(0, Ordering::Relaxed);
        node.nstate.store(0, Ordering::Relaxed);
        node.estate.store(0, Ordering::Relaxed);
        node.async_state
            .store(crate::graph::node::astate::UNFINISHED, Ordering::Relaxed);
    }
}

#[cfg(not(feature = "task-pool"))]
mod imp {
    use super::*;

    pub(super) fn animate(params: TaskParams, work: Work) -> Arc<Node> {
        Arc::new(Node::new(params, work))
    }

    pub(super) fn recycle(node: Arc<Node>) {
        drop(node);
    }
}

/// Produces a node, reusing a recycled allocation when the pool is enabled.
pub(crate) fn animate(params: TaskParams, work: Work) -> Arc<Node> {
    imp::animate(params, work)
}

/// Returns a finished async node to the pool (or drops it).
pub(crate) fn recycle(node: Arc<Node>) {
    imp::recycle(node);
}
