//! Work-stealing scheduler.
//!
//! Each worker owns a LIFO deque; thieves take the other end. A shared
//! injector accepts work from non-worker threads. Idle workers park on the
//! [`Notifier`](notifier::Notifier) after a bounded number of failed steal
//! rounds.

pub(crate) mod notifier;
pub(crate) mod work_stealing;
pub(crate) mod worker;
