//! The runtime token handed to executing tasks.
//!
//! A [`Runtime`] binds the executor to the node currently running on this
//! worker. It lets a task spawn nested async work attached to itself,
//! re-enter the scheduler while it waits (`corun_until`), and preempt
//! itself behind nested work through a [`PreemptionGuard`].

use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use weft_core::types::IntoTaskParams;
use weft_core::{RuntimeError, TaskParams};

use crate::executor::async_task::{once_runtime_work, once_work};
use crate::executor::Executor;
use crate::future::TaskFuture;
use crate::graph::flow::{Flow, Task};
use crate::graph::node::{Node, Work};
use crate::pool;

/// Non-owning token bound to (executor, currently running node).
pub struct Runtime<'e> {
    executor: &'e Executor,
    node: &'e Arc<Node>,
    worker: usize,
    /// Set by a dropped [`PreemptionGuard`] when nested children were still
    /// outstanding; read by the invoker after the body returns. Local to
    /// this invocation, so the resume path can never race it.
    preempt_pending: Cell<bool>,
}

impl<'e> Runtime<'e> {
    pub(crate) fn new(executor: &'e Executor, node: &'e Arc<Node>, worker: usize) -> Self {
        Runtime {
            executor,
            node,
            worker,
            preempt_pending: Cell::new(false),
        }
    }

    /// The executor running this task.
    pub fn executor(&self) -> &Executor {
        self.executor
    }

    /// Index of the worker thread executing this task.
    pub fn worker_id(&self) -> usize {
        self.worker
    }

    /// Name of the currently running task.
    pub fn name(&self) -> String {
        self.node.name()
    }

    /// Spawns a detached async task attached to the current node; the node
    /// stays alive until all attached children finish. Join them with
    /// [`join`](Self::join), [`corun_until`](Self::corun_until), or carry
    /// them past the body's return with a [`PreemptionGuard`].
    pub fn silent_async<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.silent_async_with((), f);
    }

    /// Attached spawn with a name or full parameters.
    pub fn silent_async_with<P, F>(&self, params: P, f: F)
    where
        P: IntoTaskParams,
        F: FnOnce() + Send + 'static,
    {
        self.spawn_attached(params.into_task_params(), Work::Async(once_work(f)));
    }

    /// Attached spawn whose body receives its own runtime token.
    pub fn silent_async_runtime<F>(&self, f: F)
    where
        F: FnOnce(&mut Runtime<'_>) + Send + 'static,
    {
        self.spawn_attached(TaskParams::default(), Work::Async(once_runtime_work(f)));
    }

    fn spawn_attached(&self, params: TaskParams, work: Work) {
        let child = pool::animate(params, work);
        *child.parent.lock() = Arc::downgrade(self.node);
        self.node.join_counter.fetch_add(1, Ordering::AcqRel);
        self.executor.bump_in_flight();
        self.executor.schedule(child);
    }

    /// Manually releases a dormant task of the running topology, as if one
    /// of its conditional predecessors had selected it.
    pub fn schedule(&self, task: &Task) {
        self.executor.release_task(&task.node);
    }

    /// Runs a flow to completion from inside this worker.
    pub fn corun(&self, flow: &Flow) -> Result<(), RuntimeError> {
        self.executor.corun(flow)
    }

    /// Re-enters the scheduler on this worker until the predicate holds.
    pub fn corun_until<P>(&self, predicate: P) -> Result<(), RuntimeError>
    where
        P: FnMut() -> bool,
    {
        self.executor.corun_until(predicate)
    }

    /// Waits for all async tasks attached to the current node, servicing
    /// the scheduler meanwhile.
    pub fn join(&self) -> Result<(), RuntimeError> {
        self.corun_until(|| self.node.join_counter.load(Ordering::Acquire) == 0)
    }

    /// Submits a detached task with a future, like
    /// [`Executor::async_task`].
    pub fn async_task<F, R>(&self, f: F) -> TaskFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.executor.async_task(f)
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        self.node
    }

    pub(crate) fn preempt_pending(&self) -> bool {
        self.preempt_pending.get()
    }

    pub(crate) fn set_preempt_pending(&self, pending: bool) {
        self.preempt_pending.set(pending);
    }
}

/// Marks the current node preempted for its guard scope: nested work
/// spawned while the guard lives keeps the node open after its body
/// returns, and the last finishing child re-enqueues it for resumption.
///
/// If every child has already finished when the guard drops, the node
/// completes inline and is never re-enqueued.
pub struct PreemptionGuard<'g, 'e> {
    rt: &'g Runtime<'e>,
}

impl<'g, 'e> PreemptionGuard<'g, 'e> {
    pub fn new(rt: &'g Runtime<'e>) -> Self {
        // Guard reference: children finishing early cannot drive the
        // counter to zero while the guard is alive.
        rt.node().join_counter.fetch_add(1, Ordering::AcqRel);
        rt.node().set_preempted();
        PreemptionGuard { rt }
    }
}

impl Drop for PreemptionGuard<'_, '_> {
    fn drop(&mut self) {
        let node = self.rt.node();
        let previous = node.join_counter.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "guard reference already released");
        if previous == 1 {
            // All children already finished; complete inline.
            node.clear_preempted();
            self.rt.set_preempt_pending(false);
        } else {
            self.rt.set_preempt_pending(true);
        }
    }
}
