//! Node invocation: variant dispatch, panic capture, the release protocol,
//! and topology teardown accounting.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use weft_core::weft_task;

use crate::executor::Executor;
use crate::graph::flow::SubflowBuilder;
use crate::graph::node::{AsyncWork, Node, StaticWork, Work};
use crate::runtime::Runtime;

impl Executor {
    /// Invokes one node: run (or skip) its body, then apply the release
    /// rule to its successors and close its accounting entry.
    pub(crate) fn invoke(&self, worker: usize, node: Arc<Node>) {
        // Resumption after nested work finished. Only the resumable async
        // form re-enters its body; everything else goes straight to the
        // release phase.
        if node.is_preempted() {
            node.clear_preempted();
            if self.reenter(worker, &node) {
                return; // preempted again
            }
            self.finish(worker, node, None);
            return;
        }

        // Cancelled topologies drain without running bodies. Async tasks
        // are not cancellable.
        if !node.is_async() && node.is_cancelled() {
            weft_task!(trace, worker = worker, task = %node.name(), "draining cancelled task");
            self.finish(worker, node, None);
            return;
        }

        let mut condition: Option<Vec<usize>> = None;
        let mut preempt_pending = false;
        let mut spliced: Option<Vec<Arc<Node>>> = None;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match &mut *node.work.lock() {
                Work::Placeholder => {}
                Work::Static(StaticWork::Plain(f)) => f(),
                Work::Static(StaticWork::WithRuntime(f)) => {
                    let mut rt = Runtime::new(self, &node, worker);
                    f(&mut rt);
                    preempt_pending = rt.preempt_pending();
                }
                Work::Subflow { build, subgraph } => {
                    // A fresh inner graph per invocation; predicate re-runs
                    // rebuild it.
                    subgraph.clear();
                    let mut builder = SubflowBuilder { graph: subgraph };
                    build(&mut builder);
                    spliced = Some(subgraph.nodes().to_vec());
                }
                Work::Condition(f) => condition = Some(vec![f()]),
                Work::MultiCondition(f) => condition = Some(f()),
                Work::Module { target } => {
                    spliced = Some(target.lock().nodes().to_vec());
                }
                Work::Async(work) | Work::DependentAsync(work) => match work {
                    AsyncWork::Plain(f) => f(),
                    AsyncWork::WithRuntime(f) => {
                        let mut rt = Runtime::new(self, &node, worker);
                        f(&mut rt);
                        preempt_pending = rt.preempt_pending();
                    }
                    AsyncWork::Resumable(f) => {
                        let mut rt = Runtime::new(self, &node, worker);
                        f(&mut rt, true);
                        preempt_pending = rt.preempt_pending();
                    }
                },
            }
        }));

        if let Err(payload) = outcome {
            self.capture_panic(worker, &node, payload);
            self.finish(worker, node, None);
            return;
        }

        // Children spawned through a preemption guard keep the node open;
        // the last one to finish re-enqueues it.
        if preempt_pending {
            return;
        }

        // Subflow and module bodies yielded an inner graph to splice in.
        if let Some(children) = spliced {
            if self.splice_under(&node, &children) {
                return; // preempted until the children finish
            }
        }

        self.finish(worker, node, condition);
    }

    /// Re-enters the body of a resumable async task with `is_first` false.
    /// Returns true if the node preempted itself again.
    fn reenter(&self, worker: usize, node: &Arc<Node>) -> bool {
        let is_resumable_async = matches!(
            &*node.work.lock(),
            Work::Async(AsyncWork::Resumable(_)) | Work::DependentAsync(AsyncWork::Resumable(_))
        );
        if !is_resumable_async {
            return false;
        }
        let mut preempt_pending = false;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Work::Async(AsyncWork::Resumable(f))
            | Work::DependentAsync(AsyncWork::Resumable(f)) = &mut *node.work.lock()
            {
                let mut rt = Runtime::new(self, node, worker);
                f(&mut rt, false);
                preempt_pending = rt.preempt_pending();
            }
        }));
        if let Err(payload) = outcome {
            self.capture_panic(worker, node, payload);
            return false;
        }
        preempt_pending
    }

    fn capture_panic(
        &self,
        worker: usize,
        node: &Arc<Node>,
        payload: Box<dyn std::any::Any + Send>,
    ) {
        node.mark_exception();
        if node.is_async() {
            // No topology to carry the payload; value-returning async tasks
            // already moved it into their future.
            weft_task!(error, worker = worker, task = %node.name(), "async task panicked");
            return;
        }
        let topology = node.topology.lock().clone();
        match topology {
            Some(topology) => {
                if !topology.record_panic(node.name(), payload) {
                    weft_task!(
                        error,
                        worker = worker,
                        task = %node.name(),
                        "panic dropped, topology already holds one"
                    );
                }
            }
            None => {
                weft_task!(error, worker = worker, task = %node.name(), "panic in unbound task");
            }
        }
    }

    /// Splices `children` into the running invocation under `parent`.
    /// Returns true when the parent was preempted behind scheduled children.
    fn splice_under(&self, parent: &Arc<Node>, children: &[Arc<Node>]) -> bool {
        if children.is_empty() {
            return false;
        }
        let Some(topology) = parent.topology.lock().clone() else {
            weft_task!(error, task = %parent.name(), "splice outside a topology");
            return false;
        };
        for child in children {
            child.bind(&topology, Arc::downgrade(parent));
            child.set_up_join_counter();
        }
        let sources: Vec<Arc<Node>> = children
            .iter()
            .filter(|c| c.is_source())
            .cloned()
            .collect();
        if sources.is_empty() {
            return false;
        }
        // Open the children's accounting entries and decide the preemption
        // before any child can possibly finish.
        parent
            .join_counter
            .fetch_add(sources.len(), Ordering::AcqRel);
        parent.set_preempted();
        for source in sources {
            self.schedule(source);
        }
        true
    }

    /// Release phase and teardown.
    fn finish(&self, worker: usize, node: Arc<Node>, condition: Option<Vec<usize>>) {
        if node.is_async() {
            self.tear_down_async(worker, node);
            return;
        }

        // Re-arm the strong in-degree before releasing successors so cyclic
        // control flow can release this node again. fetch_add, not a store:
        // a second conditional release may already be decrementing.
        node.join_counter
            .fetch_add(node.strong_in.load(Ordering::Relaxed), Ordering::AcqRel);

        let successors = node.successors.lock().clone();
        if node.is_cancelled() {
            // Unwind: every edge is treated as strong. Successors with
            // conditional in-edges never counted those edges, so their
            // decrement floors at zero instead of wrapping.
            for s in &successors {
                let released = if s.cond_in.load(Ordering::Relaxed) > 0 {
                    s.decrement_join_saturating()
                } else {
                    let previous = s.join_counter.fetch_sub(1, Ordering::AcqRel);
                    debug_assert!(previous > 0, "unwind released '{}' twice", s.name());
                    previous == 1
                };
                if released {
                    self.bump_scope(s);
                    self.schedule(Arc::clone(s));
                }
            }
        } else if node.is_conditioner() {
            if let Some(indices) = condition {
                for index in indices {
                    if let Some(s) = successors.get(index) {
                        self.bump_scope(s);
                        self.schedule(Arc::clone(s));
                    }
                }
            }
        } else {
            for s in &successors {
                let previous = s.join_counter.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0, "strong release of '{}' underflowed", s.name());
                if previous == 1 {
                    self.bump_scope(s);
                    self.schedule(Arc::clone(s));
                }
            }
        }

        self.tear_down(worker, node);
    }

    /// Closes the node's accounting entry: the enclosing parent for spliced
    /// and attached nodes, the topology otherwise.
    fn tear_down(&self, _worker: usize, node: Arc<Node>) {
        let parent = node.parent.lock().upgrade();
        match parent {
            Some(parent) => {
                let previous = parent.join_counter.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0, "child counter of '{}' underflowed", parent.name());
                if previous == 1 && parent.is_preempted() {
                    self.schedule(parent);
                }
            }
            None => {
                let topology = node.topology.lock().clone();
                if let Some(topology) = topology {
                    let previous = topology.live.fetch_sub(1, Ordering::AcqRel);
                    debug_assert!(previous > 0, "topology live counter underflowed");
                    if previous == 1 {
                        self.finalize_topology(topology);
                    }
                }
            }
        }
    }
}
