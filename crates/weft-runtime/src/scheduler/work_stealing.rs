//! Work-stealing coordinator.
//!
//! Owns the shared overflow injector and the stealer side of every worker
//! deque, and implements the steal strategy:
//! 1. Pop from the local deque (LIFO, cache-warm).
//! 2. Drain a batch from the overflow injector.
//! 3. Steal from a randomly chosen victim, sweeping the rest from there.

use std::sync::Arc;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::graph::node::Node;

pub(crate) struct WorkStealing {
    overflow: Injector<Arc<Node>>,
    stealers: Vec<Stealer<Arc<Node>>>,
    retry_cap: usize,
}

impl WorkStealing {
    /// Creates the coordinator and one deque per worker.
    pub(crate) fn new(num_workers: usize, retry_cap: usize) -> (Self, Vec<Worker<Arc<Node>>>) {
        let mut stealers = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let worker = Worker::new_lifo();
            stealers.push(worker.stealer());
            workers.push(worker);
        }
        (
            Self {
                overflow: Injector::new(),
                stealers,
                retry_cap,
            },
            workers,
        )
    }

    /// Pushes work from a non-worker context.
    pub(crate) fn inject(&self, node: Arc<Node>) {
        self.overflow.push(node);
    }

    /// Finds the next node for `index`, or None when every queue looks empty.
    pub(crate) fn next(
        &self,
        local: &Worker<Arc<Node>>,
        index: usize,
        rng: &mut SmallRng,
    ) -> Option<Arc<Node>> {
        if let Some(node) = local.pop() {
            return Some(node);
        }
        if let Some(node) = self.steal_from_overflow(local) {
            return Some(node);
        }
        self.steal_from_victims(index, rng)
    }

    fn steal_from_overflow(&self, local: &Worker<Arc<Node>>) -> Option<Arc<Node>> {
        let mut retries = 0;
        loop {
            match self.overflow.steal_batch_and_pop(local) {
                Steal::Success(node) => return Some(node),
                Steal::Empty => return None,
                Steal::Retry => {
                    retries += 1;
                    if retries >= self.retry_cap {
                        return None;
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Sweeps all other workers once, starting from a random victim.
    fn steal_from_victims(&self, index: usize, rng: &mut SmallRng) -> Option<Arc<Node>> {
        let num_workers = self.stealers.len();
        if num_workers <= 1 {
            return None;
        }
        let start = rng.gen_range(0..num_workers);
        for i in 0..num_workers {
            let victim = (start + i) % num_workers;
            if victim == index {
                continue;
            }
            let mut retries = 0;
            loop {
                match self.stealers[victim].steal() {
                    Steal::Success(node) => return Some(node),
                    Steal::Empty => break,
                    Steal::Retry => {
                        retries += 1;
                        if retries >= self.retry_cap {
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            }
        }
        None
    }

    /// Best-effort check that all queues are empty; used before parking.
    pub(crate) fn is_idle(&self) -> bool {
        if !self.overflow.is_empty() {
            return false;
        }
        self.stealers.iter().all(Stealer::is_empty)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.stealers.len()
    }
}
