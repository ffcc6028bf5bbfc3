//! Worker threads.
//!
//! Each worker runs [`worker_loop`]: drain work, then retreat through a
//! bounded steal-retry phase into parking. A thread-local record of the
//! current worker lets release paths push to the local deque and lets
//! `corun_until` re-enter the scheduler from inside a task.

use std::cell::Cell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_deque::Worker as Deque;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::executor::Executor;
use crate::graph::node::Node;
use weft_core::weft_sched;

/// Identity of the worker currently running on this thread.
#[derive(Clone, Copy)]
pub(crate) struct CurrentWorker {
    /// Identity of the owning executor (address of its shared state).
    pub(crate) executor_id: usize,
    pub(crate) index: usize,
    queue: *const Deque<Arc<Node>>,
}

impl CurrentWorker {
    /// The worker's own deque.
    ///
    /// # Safety
    /// The pointer is valid for the whole `worker_loop` activation that
    /// installed this record, and the record is removed before the loop
    /// returns; callers only reach this through the thread-local on the
    /// worker's own thread, so the deque is never accessed cross-thread.
    pub(crate) unsafe fn queue(&self) -> &Deque<Arc<Node>> {
        &*self.queue
    }
}

thread_local! {
    static CURRENT: Cell<Option<CurrentWorker>> = const { Cell::new(None) };
}

/// Returns this thread's worker record if it belongs to `executor_id`.
pub(crate) fn current_worker_of(executor_id: usize) -> Option<CurrentWorker> {
    CURRENT
        .with(Cell::get)
        .filter(|w| w.executor_id == executor_id)
}

struct TlsGuard;

impl TlsGuard {
    fn install(record: CurrentWorker) -> Self {
        CURRENT.with(|c| c.set(Some(record)));
        TlsGuard
    }
}

impl Drop for TlsGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(None));
    }
}

/// Main worker loop; runs until the executor shuts down.
pub(crate) fn worker_loop(exec: Executor, index: usize, local: Deque<Arc<Node>>) {
    let _tls = TlsGuard::install(CurrentWorker {
        executor_id: exec.id(),
        index,
        queue: &local,
    });
    let mut rng = SmallRng::seed_from_u64(0x9E37_79B9_7F4A_7C15 ^ index as u64);
    let shared = exec.shared();
    let rounds_before_park = shared.config.steal_rounds_before_park;

    weft_sched!(trace, worker = index, "worker started");

    'running: loop {
        // Drain phase.
        while let Some(node) = shared.stealing.next(&local, index, &mut rng) {
            exec.invoke(index, node);
        }

        // Retreat phase: bounded retry rounds, then park.
        let mut round = 0;
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break 'running;
            }
            if let Some(node) = shared.stealing.next(&local, index, &mut rng) {
                exec.invoke(index, node);
                continue 'running;
            }
            round += 1;
            if round < rounds_before_park {
                std::thread::yield_now();
                continue;
            }

            let ticket = shared.notifier.ticket();
            if !shared.stealing.is_idle() {
                round = 0;
                continue;
            }
            if shared.shutdown.load(Ordering::Acquire) {
                break 'running;
            }
            weft_sched!(trace, worker = index, "parking");
            shared.notifier.wait(ticket);
            round = 0;
        }
    }

    weft_sched!(trace, worker = index, "worker stopped");
}
