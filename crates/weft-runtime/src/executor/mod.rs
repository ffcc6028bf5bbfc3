//! The executor: worker threads, topology lifecycle, and the public run
//! surface.

pub(crate) mod async_task;
pub(crate) mod invoke;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use weft_core::{weft_sched, weft_topo, RuntimeError};

use crate::config::ExecutorConfig;
use crate::future::{promise_pair, TaskFuture};
use crate::graph::flow::Flow;
use crate::graph::node::Node;
use crate::scheduler::notifier::Notifier;
use crate::scheduler::work_stealing::WorkStealing;
use crate::scheduler::worker::{self, current_worker_of};
use crate::topology::Topology;

/// State shared between the executor handle and its worker threads.
pub(crate) struct Shared {
    pub(crate) config: ExecutorConfig,
    pub(crate) stealing: WorkStealing,
    pub(crate) notifier: Notifier,
    pub(crate) shutdown: AtomicBool,
    /// Running topologies plus detached async tasks; `wait_for_all` blocks
    /// until this drains to zero.
    in_flight: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
}

/// A work-stealing executor over a fixed pool of OS threads.
///
/// Dropping the executor waits for all submitted work, then joins the
/// worker threads.
pub struct Executor {
    shared: Arc<Shared>,
    /// Present only on the owning handle; worker-side facades carry None.
    threads: Option<Vec<JoinHandle<()>>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Executor {
    /// Creates an executor with `num_workers` threads; zero selects the
    /// hardware concurrency.
    pub fn new(num_workers: usize) -> Self {
        Self::start(ExecutorConfig::with_workers(num_workers))
    }

    /// Creates an executor from a validated configuration.
    pub fn with_config(config: ExecutorConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        Ok(Self::start(config))
    }

    fn start(config: ExecutorConfig) -> Self {
        let num_workers = config.resolved_workers();
        let (stealing, deques) = WorkStealing::new(num_workers, config.steal_retry_cap);
        let shared = Arc::new(Shared {
            config,
            stealing,
            notifier: Notifier::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
        });

        let threads = deques
            .into_iter()
            .enumerate()
            .map(|(index, deque)| {
                let facade = Executor {
                    shared: Arc::clone(&shared),
                    threads: None,
                };
                std::thread::Builder::new()
                    .name(format!("weft-worker-{index}"))
                    .spawn(move || worker::worker_loop(facade, index, deque))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        weft_sched!(debug, workers = num_workers, "executor started");

        Executor {
            shared,
            threads: Some(threads),
        }
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.shared.stealing.num_workers()
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Identity shared by this handle and its worker facades.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }

    // ---- run surface ----------------------------------------------------

    /// Runs the flow once.
    ///
    /// A flow carries per-run state in its nodes, so it must not be run
    /// again (or mutated) until the returned future resolves; sequential
    /// repeats are fine.
    pub fn run(&self, flow: &Flow) -> TaskFuture<()> {
        self.run_n(flow, 1)
    }

    /// Runs the flow `n` times back to back.
    pub fn run_n(&self, flow: &Flow, n: usize) -> TaskFuture<()> {
        if n == 0 {
            return completed_future();
        }
        let mut remaining = n;
        self.run_until(flow, move || {
            remaining -= 1;
            remaining == 0
        })
    }

    /// Runs the flow repeatedly until `predicate` returns true; the
    /// predicate is evaluated once after each completed run.
    pub fn run_until<P>(&self, flow: &Flow, predicate: P) -> TaskFuture<()>
    where
        P: FnMut() -> bool + Send + 'static,
    {
        self.start_topology(flow, Some(Box::new(predicate)))
    }

    /// Runs the flow and blocks until it finishes. From a worker thread of
    /// this executor the calling worker keeps servicing the scheduler while
    /// it waits.
    pub fn run_and_wait(&self, flow: &Flow) -> Result<(), RuntimeError> {
        if current_worker_of(self.id()).is_some() {
            self.corun(flow)
        } else {
            self.run(flow).get()
        }
    }

    /// Runs the flow from inside a worker without returning the thread to
    /// the pool.
    pub fn corun(&self, flow: &Flow) -> Result<(), RuntimeError> {
        if current_worker_of(self.id()).is_none() {
            return Err(RuntimeError::NotAWorker);
        }
        let future = self.start_topology(flow, None);
        self.corun_until(|| future.is_ready())?;
        future.get()
    }

    /// Runs the scheduler loop on the calling worker thread until the
    /// predicate holds.
    pub fn corun_until<P>(&self, mut predicate: P) -> Result<(), RuntimeError>
    where
        P: FnMut() -> bool,
    {
        let Some(current) = current_worker_of(self.id()) else {
            return Err(RuntimeError::NotAWorker);
        };
        // SAFETY: the record was read from this thread's own TLS, so the
        // deque pointer refers to the deque owned by this thread's live
        // worker_loop activation.
        let local = unsafe { current.queue() };
        let mut rng = SmallRng::seed_from_u64(0xA076_1D64_78BD_642F ^ current.index as u64);
        loop {
            if predicate() {
                return Ok(());
            }
            match self.shared.stealing.next(local, current.index, &mut rng) {
                Some(node) => self.invoke(current.index, node),
                None => std::thread::yield_now(),
            }
        }
    }

    /// Blocks until every submitted topology and detached async task has
    /// finished.
    pub fn wait_for_all(&self) {
        let mut guard = self.shared.idle_lock.lock();
        while self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            self.shared.idle_cv.wait(&mut guard);
        }
    }

    // ---- topology lifecycle ---------------------------------------------

    fn start_topology(
        &self,
        flow: &Flow,
        predicate: Option<Box<dyn FnMut() -> bool + Send>>,
    ) -> TaskFuture<()> {
        let nodes = flow.snapshot();
        let (promise, future) = promise_pair();
        let topology = Arc::new(Topology::new(
            nodes,
            predicate,
            promise,
            Some(flow.graph_arc()),
        ));
        let future = future.attach_topology(Arc::clone(&topology));

        if topology.nodes.is_empty() || topology.sources.is_empty() {
            // Nothing can ever be released; an all-cyclic strong graph is
            // rejected the same way an empty one completes trivially.
            if let Some(promise) = topology.promise.lock().take() {
                promise.complete(Ok(()));
            }
            return future;
        }

        weft_topo!(debug, flow = flow.name(), nodes = topology.nodes.len(), "topology started");

        self.bump_in_flight();
        for node in &topology.nodes {
            node.bind(&topology, Weak::new());
            node.set_up_join_counter();
        }
        topology.live.store(topology.sources.len(), Ordering::Release);
        for source in topology.sources.clone() {
            self.schedule(source);
        }
        future
    }

    pub(crate) fn restart_topology(&self, topology: &Arc<Topology>) {
        weft_topo!(trace, "topology restarted");
        for node in &topology.nodes {
            node.set_up_join_counter();
        }
        topology
            .live
            .store(topology.sources.len(), Ordering::Release);
        for source in topology.sources.clone() {
            self.schedule(source);
        }
    }

    pub(crate) fn finalize_topology(&self, topology: Arc<Topology>) {
        if !topology.is_cancelled() {
            let rerun = {
                let mut predicate = topology.predicate.lock();
                match predicate.as_mut() {
                    Some(predicate) => !predicate(),
                    None => false,
                }
            };
            if rerun {
                self.restart_topology(&topology);
                return;
            }
        }

        weft_topo!(
            debug,
            cancelled = topology.is_cancelled(),
            exception = topology.has_exception(),
            "topology finished"
        );

        let result = topology.take_result();
        if let Some(promise) = topology.promise.lock().take() {
            promise.complete(result);
        }
        self.dec_in_flight();
    }

    // ---- scheduling ------------------------------------------------------

    /// Makes a node ready: the releasing worker's own deque when called from
    /// a worker of this executor, the shared overflow queue otherwise.
    pub(crate) fn schedule(&self, node: Arc<Node>) {
        match current_worker_of(self.id()) {
            // SAFETY: record read from this thread's TLS; see `corun_until`.
            Some(current) => unsafe { current.queue() }.push(node),
            None => self.shared.stealing.inject(node),
        }
        self.shared.notifier.notify_one();
    }

    /// Manual release of a dormant task of a running topology, with the
    /// same accounting as an edge-triggered release.
    pub(crate) fn release_task(&self, node: &Arc<Node>) {
        self.bump_scope(node);
        self.schedule(Arc::clone(node));
    }

    /// Opens one unit of outstanding work in the scope that owns `node`
    /// (enclosing parent, else its topology).
    pub(crate) fn bump_scope(&self, node: &Arc<Node>) {
        if let Some(parent) = node.parent.lock().upgrade() {
            parent.join_counter.fetch_add(1, Ordering::AcqRel);
            return;
        }
        let topology = node.topology.lock().clone();
        if let Some(topology) = topology {
            topology.live.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn bump_in_flight(&self) {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dec_in_flight(&self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.shared.idle_lock.lock();
            self.shared.idle_cv.notify_all();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let Some(threads) = self.threads.take() else {
            return; // worker-side facade
        };
        self.wait_for_all();
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notifier.notify_all();
        for handle in threads {
            let _ = handle.join();
        }
        weft_sched!(debug, "executor stopped");
    }
}

fn completed_future() -> TaskFuture<()> {
    let (promise, future) = promise_pair();
    promise.complete(Ok(()));
    future
}
