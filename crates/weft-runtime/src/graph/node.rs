//! Task vertices.
//!
//! A [`Node`] is a polymorphic vertex in a task graph: it carries one of the
//! eight work variants, its edge lists, the atomic join counter that drives
//! the dependency protocol, and the per-node state words.
//!
//! Shared-write points are the atomics only (`join_counter`, `nstate`,
//! `estate`, `async_state`); every other field is guarded by a mutex and is
//! touched by at most one worker at a time under the scheduling protocol.

use std::any::Any;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use weft_core::types::{TaskParams, TaskType};

use crate::graph::Graph;
use crate::runtime::Runtime;
use crate::topology::Topology;

/// Single-writer node state bits.
pub(crate) mod nstate {
    /// The node is paused while nested work runs; the joining worker
    /// re-enqueues it instead of completing it.
    pub const PREEMPTED: u32 = 1 << 0;
    /// The node has at least one conditional in-edge.
    pub const CONDITIONED: u32 = 1 << 1;
}

/// Multi-writer node state bits.
pub(crate) mod estate {
    pub const CANCELLED: u8 = 1 << 0;
    /// Recycling is forbidden while set.
    pub const ANCHORED: u8 = 1 << 1;
    pub const EXCEPTION: u8 = 1 << 2;
}

/// Completion state of a dependent-async node.
pub(crate) mod astate {
    pub const UNFINISHED: u8 = 0;
    pub const FINISHED: u8 = 1;
}

/// Work body of a static task.
pub(crate) enum StaticWork {
    Plain(Box<dyn FnMut() + Send>),
    WithRuntime(Box<dyn FnMut(&mut Runtime<'_>) + Send>),
}

/// Work body of an async task. The `bool` of the resumable form is
/// `is_first`: true on the initial dispatch, false when the node is
/// re-entered after a preemption.
pub(crate) enum AsyncWork {
    Plain(Box<dyn FnMut() + Send>),
    WithRuntime(Box<dyn FnMut(&mut Runtime<'_>) + Send>),
    Resumable(Box<dyn FnMut(&mut Runtime<'_>, bool) + Send>),
}

/// Tagged union over the work variants a node can carry.
pub(crate) enum Work {
    Placeholder,
    Static(StaticWork),
    Subflow {
        build: Box<dyn FnMut(&mut crate::graph::flow::SubflowBuilder<'_>) + Send>,
        subgraph: Graph,
    },
    Condition(Box<dyn FnMut() -> usize + Send>),
    MultiCondition(Box<dyn FnMut() -> Vec<usize> + Send>),
    Module {
        target: Arc<Mutex<Graph>>,
    },
    Async(AsyncWork),
    DependentAsync(AsyncWork),
}

impl Work {
    pub(crate) fn task_type(&self) -> TaskType {
        match self {
            Work::Placeholder => TaskType::Placeholder,
            Work::Static(_) => TaskType::Static,
            Work::Subflow { .. } => TaskType::Subflow,
            Work::Condition(_) => TaskType::Condition,
            Work::MultiCondition(_) => TaskType::MultiCondition,
            Work::Module { .. } => TaskType::Module,
            Work::Async(_) => TaskType::Async,
            Work::DependentAsync(_) => TaskType::DependentAsync,
        }
    }
}

/// A task vertex. Owned by a [`Graph`]; referenced (non-owning through
/// `Weak`, or via scheduler queues through `Arc`) everywhere else.
pub(crate) struct Node {
    kind: TaskType,

    pub(crate) name: Mutex<String>,
    pub(crate) data: Mutex<Option<Box<dyn Any + Send>>>,

    pub(crate) work: Mutex<Work>,

    /// Owning invocation, set once per run.
    pub(crate) topology: Mutex<Option<Arc<Topology>>>,
    /// Enclosing subflow or module node; dangling for top-level nodes.
    pub(crate) parent: Mutex<Weak<Node>>,

    /// Forward edges. Strong references; ownership cycles through
    /// conditional loops are broken by `Graph::drop`.
    pub(crate) successors: Mutex<Vec<Arc<Node>>>,
    /// Backward edges, weak to keep the edge relation acyclic in ownership.
    pub(crate) dependents: Mutex<Vec<Weak<Node>>>,

    /// Unsatisfied strong dependencies before release; outstanding nested
    /// children afterwards.
    pub(crate) join_counter: AtomicUsize,
    /// Strong in-degree as of the last setup; the release phase re-arms the
    /// join counter with this so cyclic control flow can release the node
    /// again.
    pub(crate) strong_in: AtomicUsize,
    /// Conditional in-degree, tracked apart from the strong counter.
    pub(crate) cond_in: AtomicUsize,

    pub(crate) nstate: AtomicU32,
    pub(crate) estate: AtomicU8,
    pub(crate) async_state: AtomicU8,
}

impl Node {
    pub(crate) fn new(params: TaskParams, work: Work) -> Self {
        Node {
            kind: work.task_type(),
            name: Mutex::new(params.name),
            data: Mutex::new(params.data),
            work: Mutex::new(work),
            topology: Mutex::new(None),
            parent: Mutex::new(Weak::new()),
            successors: Mutex::new(Vec::new()),
            dependents: Mutex::new(Vec::new()),
            join_counter: AtomicUsize::new(0),
            strong_in: AtomicUsize::new(0),
            cond_in: AtomicUsize::new(0),
            nstate: AtomicU32::new(0),
            estate: AtomicU8::new(0),
            async_state: AtomicU8::new(astate::UNFINISHED),
        }
    }

    pub(crate) fn task_type(&self) -> TaskType {
        self.kind
    }

    pub(crate) fn is_conditioner(&self) -> bool {
        matches!(self.kind, TaskType::Condition | TaskType::MultiCondition)
    }

    pub(crate) fn is_async(&self) -> bool {
        matches!(self.kind, TaskType::Async | TaskType::DependentAsync)
    }

    pub(crate) fn name(&self) -> String {
        self.name.lock().clone()
    }

    // ---- edges ----------------------------------------------------------

    /// Adds the edge `self -> v`.
    pub(crate) fn precede(self: &Arc<Self>, v: &Arc<Node>) {
        self.successors.lock().push(Arc::clone(v));
        v.dependents.lock().push(Arc::downgrade(self));
    }

    /// Removes every edge between `self` and `other`, in both directions.
    pub(crate) fn unlink(self: &Arc<Self>, other: &Arc<Node>) {
        self.successors
            .lock()
            .retain(|s| !Arc::ptr_eq(s, other));
        other
            .dependents
            .lock()
            .retain(|d| d.upgrade().map_or(false, |d| !Arc::ptr_eq(&d, self)));
        other
            .successors
            .lock()
            .retain(|s| !Arc::ptr_eq(s, self));
        self.dependents
            .lock()
            .retain(|d| d.upgrade().map_or(false, |d| !Arc::ptr_eq(&d, other)));
    }

    pub(crate) fn num_successors(&self) -> usize {
        self.successors.lock().len()
    }

    pub(crate) fn num_dependents(&self) -> usize {
        self.dependents.lock().len()
    }

    pub(crate) fn num_strong_dependents(&self) -> usize {
        self.dependents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|d| !d.is_conditioner())
            .count()
    }

    pub(crate) fn num_weak_dependents(&self) -> usize {
        self.dependents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|d| d.is_conditioner())
            .count()
    }

    /// True for nodes released at topology start.
    pub(crate) fn is_source(&self) -> bool {
        self.dependents.lock().is_empty()
    }

    // ---- per-run setup --------------------------------------------------

    /// Computes the strong and conditional in-degrees for one invocation and
    /// resets the transient run state.
    pub(crate) fn set_up_join_counter(&self) {
        let mut strong = 0usize;
        let mut conditional = 0usize;
        for dep in self.dependents.lock().iter().filter_map(Weak::upgrade) {
            if dep.is_conditioner() {
                conditional += 1;
            } else {
                strong += 1;
            }
        }
        self.join_counter.store(strong, Ordering::Relaxed);
        self.strong_in.store(strong, Ordering::Relaxed);
        self.cond_in.store(conditional, Ordering::Relaxed);
        let flags = if conditional > 0 { nstate::CONDITIONED } else { 0 };
        self.nstate.store(flags, Ordering::Relaxed);
        self.estate
            .fetch_and(estate::ANCHORED, Ordering::Relaxed);
    }

    /// Binds the node to a topology invocation under a parent scope.
    pub(crate) fn bind(&self, topology: &Arc<Topology>, parent: Weak<Node>) {
        *self.topology.lock() = Some(Arc::clone(topology));
        *self.parent.lock() = parent;
    }

    // ---- state flags ----------------------------------------------------

    pub(crate) fn is_preempted(&self) -> bool {
        self.nstate.load(Ordering::Relaxed) & nstate::PREEMPTED != 0
    }

    pub(crate) fn set_preempted(&self) {
        self.nstate.fetch_or(nstate::PREEMPTED, Ordering::Relaxed);
    }

    pub(crate) fn clear_preempted(&self) {
        self.nstate
            .fetch_and(!nstate::PREEMPTED, Ordering::Relaxed);
    }

    #[cfg_attr(not(feature = "task-pool"), allow(dead_code))]
    pub(crate) fn is_anchored(&self) -> bool {
        self.estate.load(Ordering::Relaxed) & estate::ANCHORED != 0
    }

    pub(crate) fn mark_exception(&self) {
        self.estate.fetch_or(estate::EXCEPTION, Ordering::Relaxed);
    }

    /// Cancellation is observed from the owning topology or from a cancelled
    /// enclosing node.
    pub(crate) fn is_cancelled(&self) -> bool {
        if let Some(topology) = self.topology.lock().as_ref() {
            if topology.is_cancelled() {
                return true;
            }
        }
        if let Some(parent) = self.parent.lock().upgrade() {
            if parent.estate.load(Ordering::Relaxed) & estate::CANCELLED != 0 {
                return true;
            }
        }
        false
    }

    // ---- join counter ---------------------------------------------------

    /// Strong decrement used on the unwind path, floored at zero because a
    /// cancelled conditioner releases successors whose counters never
    /// included its edges. Returns true when this call moved the counter
    /// from one to zero.
    pub(crate) fn decrement_join_saturating(&self) -> bool {
        let mut current = self.join_counter.load(Ordering::Relaxed);
        loop {
            // Checked decrement: a counter already at zero stays there.
            let Some(next) = current.checked_sub(1) else {
                return false;
            };
            match self.join_counter.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current == 1,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Holds `ANCHORED` on a node for the guard's lifetime so the recycler
/// cannot retire it while another worker still dereferences it.
pub(crate) struct AnchorGuard<'a> {
    node: &'a Node,
}

impl<'a> AnchorGuard<'a> {
    pub(crate) fn new(node: &'a Node) -> Self {
        node.estate.fetch_or(estate::ANCHORED, Ordering::Relaxed);
        AnchorGuard { node }
    }
}

impl Drop for AnchorGuard<'_> {
    fn drop(&mut self) {
        self.node
            .estate
            .fetch_and(!estate::ANCHORED, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::types::TaskParams;

    fn placeholder(name: &str) -> Arc<Node> {
        Arc::new(Node::new(TaskParams::named(name), Work::Placeholder))
    }

    fn condition(name: &str) -> Arc<Node> {
        Arc::new(Node::new(
            TaskParams::named(name),
            Work::Condition(Box::new(|| 0)),
        ))
    }

    #[test]
    fn precede_links_both_directions() {
        let a = placeholder("a");
        let b = placeholder("b");
        a.precede(&b);
        assert_eq!(a.num_successors(), 1);
        assert_eq!(b.num_dependents(), 1);
        assert!(a.is_source());
        assert!(!b.is_source());
    }

    #[test]
    fn join_counter_counts_strong_edges_only() {
        let a = placeholder("a");
        let c = condition("c");
        let target = placeholder("t");
        a.precede(&target);
        c.precede(&target);

        target.set_up_join_counter();
        assert_eq!(target.join_counter.load(Ordering::Relaxed), 1);
        assert_eq!(target.cond_in.load(Ordering::Relaxed), 1);
        assert!(target.nstate.load(Ordering::Relaxed) & nstate::CONDITIONED != 0);
        assert_eq!(target.num_strong_dependents(), 1);
        assert_eq!(target.num_weak_dependents(), 1);
    }

    #[test]
    fn saturating_decrement_floors_at_zero() {
        let n = placeholder("n");
        n.join_counter.store(1, Ordering::Relaxed);
        assert!(n.decrement_join_saturating());
        assert!(!n.decrement_join_saturating());
        assert_eq!(n.join_counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn anchor_guard_sets_and_clears() {
        let n = placeholder("n");
        assert!(!n.is_anchored());
        {
            let _guard = AnchorGuard::new(&n);
            assert!(n.is_anchored());
        }
        assert!(!n.is_anchored());
    }

    #[test]
    fn unlink_removes_edges() {
        let a = placeholder("a");
        let b = placeholder("b");
        a.precede(&b);
        a.unlink(&b);
        assert_eq!(a.num_successors(), 0);
        assert_eq!(b.num_dependents(), 0);
    }
}
