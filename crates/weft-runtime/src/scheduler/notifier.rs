//! Sleep/wake coordination for idle workers.
//!
//! An epoch counter detects pushes that race with a worker going to sleep:
//! the worker takes a ticket, re-checks the queues, and only commits to the
//! condvar if no push advanced the epoch in between. The SeqCst pairing of
//! the epoch bump with the sleeper-count probe is what rules out the lost
//! wakeup: either the sleeper observes the new epoch, or the producer
//! observes the sleeper.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

pub(crate) struct Notifier {
    epoch: AtomicUsize,
    sleepers: AtomicUsize,
    lock: Mutex<()>,
    cv: Condvar,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Notifier {
            epoch: AtomicUsize::new(0),
            sleepers: AtomicUsize::new(0),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Called after every push.
    pub(crate) fn notify_one(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.cv.notify_one();
        }
    }

    /// Wakes every parked worker (shutdown, bulk pushes).
    pub(crate) fn notify_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.cv.notify_all();
        }
    }

    /// Takes a ticket; the caller re-checks its wait condition before
    /// committing with [`wait`](Self::wait).
    pub(crate) fn ticket(&self) -> usize {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Parks until any notification arrives after `ticket` was taken.
    /// Returns immediately if one already has. Spurious returns are allowed.
    pub(crate) fn wait(&self, ticket: usize) {
        let mut guard = self.lock.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        if self.epoch.load(Ordering::SeqCst) != ticket {
            self.sleepers.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        self.cv.wait(&mut guard);
        self.sleepers.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn stale_ticket_returns_immediately() {
        let n = Notifier::new();
        let ticket = n.ticket();
        n.notify_one();
        // Must not block.
        n.wait(ticket);
    }

    #[test]
    fn wakes_parked_thread() {
        let n = Arc::new(Notifier::new());
        let woke = Arc::new(AtomicBool::new(false));

        let handle = {
            let n = Arc::clone(&n);
            let woke = Arc::clone(&woke);
            std::thread::spawn(move || {
                let ticket = n.ticket();
                n.wait(ticket);
                woke.store(true, Ordering::SeqCst);
            })
        };

        // Keep notifying until the sleeper wakes; a single notify could race
        // with the thread not having parked yet.
        while !woke.load(Ordering::SeqCst) {
            n.notify_all();
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.join().unwrap();
    }
}
