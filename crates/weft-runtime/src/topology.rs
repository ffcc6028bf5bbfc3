//! Topologies: one runtime instance of a graph invocation.
//!
//! A topology snapshots the node set of a flow, tracks how much scheduled
//! work is still in flight, carries the cancellation and panic state for the
//! invocation, and fulfils the completion promise when the last node tears
//! down.

use std::any::Any;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use weft_core::RuntimeError;

use crate::future::Promise;
use crate::graph::node::{estate, Node};
use crate::graph::Graph;

/// First captured panic of an invocation; later panics are logged and
/// dropped.
pub(crate) struct PanicCapture {
    pub(crate) task_name: String,
    pub(crate) payload: Box<dyn Any + Send>,
}

/// One runtime instance of a graph invocation.
pub(crate) struct Topology {
    /// Top-level nodes of the invocation, in insertion order.
    pub(crate) nodes: Vec<Arc<Node>>,
    /// Nodes with no in-edges, released at (re)start.
    pub(crate) sources: Vec<Arc<Node>>,
    /// Scheduled-but-not-torn-down work. Every release adds one, every
    /// completed invocation of a top-level node removes one; zero completes
    /// the topology. This conservation law is what lets conditional loops
    /// and cancellation drains terminate.
    pub(crate) live: AtomicUsize,
    estate: AtomicU8,
    panic_slot: Mutex<Option<PanicCapture>>,
    /// Re-run gate: after each completed run the topology restarts while
    /// the predicate returns false.
    pub(crate) predicate: Mutex<Option<Box<dyn FnMut() -> bool + Send>>>,
    pub(crate) promise: Mutex<Option<Promise<()>>>,
    /// Keeps the flow's graph alive for the whole invocation, so dropping
    /// the user's `Flow` mid-run cannot dismantle the edges under the
    /// workers.
    _graph: Option<Arc<Mutex<Graph>>>,
}

impl Topology {
    pub(crate) fn new(
        nodes: Vec<Arc<Node>>,
        predicate: Option<Box<dyn FnMut() -> bool + Send>>,
        promise: Promise<()>,
        graph: Option<Arc<Mutex<Graph>>>,
    ) -> Self {
        let sources = nodes.iter().filter(|n| n.is_source()).cloned().collect();
        Topology {
            nodes,
            sources,
            live: AtomicUsize::new(0),
            estate: AtomicU8::new(0),
            panic_slot: Mutex::new(None),
            predicate: Mutex::new(predicate),
            promise: Mutex::new(Some(promise)),
            _graph: graph,
        }
    }

    pub(crate) fn cancel(&self) {
        self.estate.fetch_or(estate::CANCELLED, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.estate.load(Ordering::Relaxed) & estate::CANCELLED != 0
    }

    pub(crate) fn has_exception(&self) -> bool {
        self.estate.load(Ordering::Relaxed) & estate::EXCEPTION != 0
    }

    /// Stores the first captured panic; returns false if one was already
    /// held (the caller logs and drops the payload).
    pub(crate) fn record_panic(&self, task_name: String, payload: Box<dyn Any + Send>) -> bool {
        self.estate.fetch_or(estate::EXCEPTION, Ordering::Relaxed);
        let mut slot = self.panic_slot.lock();
        if slot.is_none() {
            *slot = Some(PanicCapture { task_name, payload });
            true
        } else {
            false
        }
    }

    /// Drains the invocation outcome for the completion promise.
    pub(crate) fn take_result(&self) -> Result<(), RuntimeError> {
        match self.panic_slot.lock().take() {
            Some(capture) => Err(RuntimeError::from_panic(
                &capture.task_name,
                capture.payload.as_ref(),
            )),
            None => Ok(()),
        }
    }
}
