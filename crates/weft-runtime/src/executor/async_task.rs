//! Fire-and-forget and dependent async tasks.
//!
//! Async tasks have no graph-level edges. Dependent async tasks gain
//! dynamic strong edges on other dependent async tasks at creation time:
//! a predecessor that already finished contributes nothing. The edge
//! registration and the finishing side serialise on the predecessor's
//! successor lock, so an edge is either observed by the finisher's drain or
//! skipped because the state was already final.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use weft_core::types::IntoTaskParams;
use weft_core::{RuntimeError, TaskParams};

use crate::executor::Executor;
use crate::future::{promise_pair, TaskFuture};
use crate::graph::node::{astate, AnchorGuard, AsyncWork, Node, Work};
use crate::pool;
use crate::runtime::Runtime;

/// Handle to a dependent async task; cloneable, usable as a predecessor of
/// later dependent async tasks. The node is recycled once the task has run
/// and all handles are gone.
#[derive(Clone)]
pub struct AsyncTask {
    pub(crate) node: Arc<Node>,
}

impl AsyncTask {
    /// True once the task's body has finished.
    pub fn is_done(&self) -> bool {
        self.node.async_state.load(Ordering::Acquire) == astate::FINISHED
    }

    pub fn name(&self) -> String {
        self.node.name()
    }
}

impl std::fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTask")
            .field("name", &self.name())
            .field("done", &self.is_done())
            .finish()
    }
}

/// Adapts a `FnOnce` body to the stored `FnMut` form.
pub(crate) fn once_work<F>(f: F) -> AsyncWork
where
    F: FnOnce() + Send + 'static,
{
    let mut slot = Some(f);
    AsyncWork::Plain(Box::new(move || {
        if let Some(f) = slot.take() {
            f();
        }
    }))
}

pub(crate) fn once_runtime_work<F>(f: F) -> AsyncWork
where
    F: FnOnce(&mut Runtime<'_>) + Send + 'static,
{
    let mut slot = Some(f);
    AsyncWork::WithRuntime(Box::new(move |rt| {
        if let Some(f) = slot.take() {
            f(rt);
        }
    }))
}

/// Wraps a value-returning body so its result (or panic) lands in the
/// paired future before the scheduler sees the outcome.
fn promising_work<F, R>(f: F) -> (AsyncWork, TaskFuture<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (promise, future) = promise_pair();
    let work = once_work(move || match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => promise.complete(Ok(value)),
        Err(payload) => {
            promise.complete(Err(RuntimeError::from_panic("", payload.as_ref())));
            resume_unwind(payload);
        }
    });
    (work, future)
}

impl Executor {
    // ---- fire-and-forget ------------------------------------------------

    /// Submits a detached task.
    pub fn silent_async<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.silent_async_with((), f);
    }

    /// Submits a detached task with a name or full parameters.
    pub fn silent_async_with<P, F>(&self, params: P, f: F)
    where
        P: IntoTaskParams,
        F: FnOnce() + Send + 'static,
    {
        self.spawn_detached(params.into_task_params(), Work::Async(once_work(f)));
    }

    /// Submits a detached task that receives the runtime token.
    pub fn silent_async_runtime<F>(&self, f: F)
    where
        F: FnOnce(&mut Runtime<'_>) + Send + 'static,
    {
        self.spawn_detached(TaskParams::default(), Work::Async(once_runtime_work(f)));
    }

    /// Submits a detached task that may preempt itself; the body is
    /// re-entered with `is_first` false when its nested work finishes.
    pub fn silent_async_resumable<F>(&self, f: F)
    where
        F: FnMut(&mut Runtime<'_>, bool) + Send + 'static,
    {
        self.spawn_detached(
            TaskParams::default(),
            Work::Async(AsyncWork::Resumable(Box::new(f))),
        );
    }

    /// Submits a detached task and returns a future for its result.
    pub fn async_task<F, R>(&self, f: F) -> TaskFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (work, future) = promising_work(f);
        self.spawn_detached(TaskParams::default(), Work::Async(work));
        future
    }

    fn spawn_detached(&self, params: TaskParams, work: Work) {
        let node = pool::animate(params, work);
        self.bump_in_flight();
        self.schedule(node);
    }

    // ---- dependent async ------------------------------------------------

    /// Submits an async task ordered after `predecessors`.
    pub fn silent_dependent_async<F>(&self, f: F, predecessors: &[AsyncTask]) -> AsyncTask
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_dependent(TaskParams::default(), once_work(f), predecessors)
    }

    /// Like [`silent_dependent_async`](Self::silent_dependent_async) with a
    /// name or full parameters.
    pub fn silent_dependent_async_with<P, F>(
        &self,
        params: P,
        f: F,
        predecessors: &[AsyncTask],
    ) -> AsyncTask
    where
        P: IntoTaskParams,
        F: FnOnce() + Send + 'static,
    {
        self.spawn_dependent(params.into_task_params(), once_work(f), predecessors)
    }

    /// Submits an async task ordered after `predecessors`, returning both
    /// the handle and a future for the body's result.
    pub fn dependent_async<F, R>(
        &self,
        f: F,
        predecessors: &[AsyncTask],
    ) -> (AsyncTask, TaskFuture<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (work, future) = promising_work(f);
        let task = self.spawn_dependent(TaskParams::default(), work, predecessors);
        (task, future)
    }

    fn spawn_dependent(
        &self,
        params: TaskParams,
        work: AsyncWork,
        predecessors: &[AsyncTask],
    ) -> AsyncTask {
        let node = pool::animate(params, Work::DependentAsync(work));

        // Creation reference: the node cannot launch while edges are still
        // being registered.
        node.join_counter.store(1, Ordering::Relaxed);
        for predecessor in predecessors {
            let pred = &predecessor.node;
            let mut successors = pred.successors.lock();
            // Anything not yet final will drain its successor list under
            // this same lock; a finished predecessor contributes nothing.
            if pred.async_state.load(Ordering::Acquire) != astate::FINISHED {
                node.join_counter.fetch_add(1, Ordering::Relaxed);
                successors.push(Arc::clone(&node));
            }
        }

        self.bump_in_flight();
        let previous = node.join_counter.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "creation reference already released");
        if previous == 1 {
            self.schedule(Arc::clone(&node));
        }
        AsyncTask { node }
    }

    // ---- teardown -------------------------------------------------------

    /// Completion path for both async variants: publish the final state,
    /// release dynamic dependents, close the accounting entry, recycle.
    pub(crate) fn tear_down_async(&self, _worker: usize, node: Arc<Node>) {
        if node.task_type() == weft_core::TaskType::DependentAsync {
            let drained: Vec<Arc<Node>> = {
                let mut successors = node.successors.lock();
                node.async_state.store(astate::FINISHED, Ordering::Release);
                successors.drain(..).collect()
            };
            for successor in drained {
                let previous = successor.join_counter.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0, "dependent async released twice");
                if previous == 1 {
                    self.schedule(successor);
                }
            }
        }

        if let Some(parent) = node.parent.lock().upgrade() {
            // The parent may be finishing its own corun on another worker
            // right now; hold it until the decrement lands.
            let _anchor = AnchorGuard::new(&parent);
            let previous = parent.join_counter.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(previous > 0, "child counter of '{}' underflowed", parent.name());
            if previous == 1 && parent.is_preempted() {
                self.schedule(Arc::clone(&parent));
            }
        }

        // Every async node, attached or detached, holds one in-flight unit.
        self.dec_in_flight();
        pool::recycle(node);
    }
}
