//! One-shot completion promises and their waitable futures.
//!
//! Topology runs and value-returning async tasks both hand the caller a
//! [`TaskFuture`]. The engine is thread-based, so the future blocks on a
//! condvar rather than integrating with an async reactor; workers that need
//! to wait on one from inside a task use
//! [`Runtime::corun_until`](crate::Runtime::corun_until) instead.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use weft_core::RuntimeError;

use crate::topology::Topology;

struct Shared<T> {
    slot: Mutex<Option<Result<T, RuntimeError>>>,
    cv: Condvar,
}

/// Fulfilment side of a one-shot future.
pub(crate) struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Promise<T> {
    /// Fulfils the future and wakes all waiters. Later calls are ignored.
    pub(crate) fn complete(&self, value: Result<T, RuntimeError>) {
        let mut slot = self.shared.slot.lock();
        if slot.is_none() {
            *slot = Some(value);
            self.shared.cv.notify_all();
        }
    }
}

/// A waitable handle to the completion of a topology run or an async task.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
    topology: Option<Arc<Topology>>,
}

impl<T> TaskFuture<T> {
    /// Returns true once the result is available.
    pub fn is_ready(&self) -> bool {
        self.shared.slot.lock().is_some()
    }

    /// Blocks the calling thread until the result is available.
    ///
    /// Must not be called from a worker thread of the producing executor;
    /// use `Runtime::corun_until` there.
    pub fn wait(&self) {
        let mut slot = self.shared.slot.lock();
        while slot.is_none() {
            self.shared.cv.wait(&mut slot);
        }
    }

    /// Waits for and takes the result.
    pub fn get(self) -> Result<T, RuntimeError> {
        let mut slot = self.shared.slot.lock();
        while slot.is_none() {
            self.shared.cv.wait(&mut slot);
        }
        slot.take().expect("future fulfilled")
    }

    /// Requests cancellation of the producing topology.
    ///
    /// A no-op for futures not backed by a topology (async task results):
    /// async tasks are not cancellable.
    pub fn cancel(&self) {
        if let Some(topology) = &self.topology {
            topology.cancel();
        }
    }

    pub(crate) fn attach_topology(mut self, topology: Arc<Topology>) -> Self {
        self.topology = Some(topology);
        self
    }
}

/// Creates a connected promise/future pair.
pub(crate) fn promise_pair<T>() -> (Promise<T>, TaskFuture<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        cv: Condvar::new(),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        TaskFuture {
            shared,
            topology: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_then_get() {
        let (promise, future) = promise_pair::<u32>();
        assert!(!future.is_ready());
        promise.complete(Ok(9));
        assert!(future.is_ready());
        assert_eq!(future.get().unwrap(), 9);
    }

    #[test]
    fn second_completion_is_ignored() {
        let (promise, future) = promise_pair::<u32>();
        promise.complete(Ok(1));
        promise.complete(Ok(2));
        assert_eq!(future.get().unwrap(), 1);
    }

    #[test]
    fn cross_thread_wait() {
        let (promise, future) = promise_pair::<String>();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            promise.complete(Ok("done".to_string()));
        });
        assert_eq!(future.get().unwrap(), "done");
        handle.join().unwrap();
    }
}
