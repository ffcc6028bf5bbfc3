//! Work-stealing task-graph execution engine.
//!
//! Users build a [`Flow`] whose vertices are units of work (plain closures,
//! nested subflows, data-dependent conditions, composable modules) and whose
//! edges are happens-before constraints, then hand it to an [`Executor`]:
//!
//! ```
//! use weft_runtime::{Executor, Flow};
//!
//! let mut flow = Flow::named("hello");
//! let a = flow.emplace(|| println!("a")).with_name("a");
//! let b = flow.emplace(|| println!("b")).with_name("b");
//! a.precede(&[&b]);
//!
//! let executor = Executor::new(4);
//! executor.run(&flow).get().unwrap();
//! ```
//!
//! The executor schedules released nodes onto per-worker LIFO deques with a
//! shared overflow queue for external submissions; idle workers steal from
//! random victims and park when the system drains. Tasks can expand the
//! running graph (subflows, modules), branch on data ([`Flow::emplace_condition`]),
//! spawn detached or dependency-ordered async work, and re-enter the
//! scheduler while they wait ([`Runtime::corun_until`]).
//!
//! Panics inside task bodies are captured per topology and surface once
//! through the [`TaskFuture`] returned by `run`; cancellation via
//! [`TaskFuture::cancel`] drains the topology without running further
//! bodies.

mod config;
mod executor;
mod future;
mod graph;
mod pool;
mod runtime;
mod scheduler;
mod topology;

pub use config::ExecutorConfig;
pub use executor::async_task::AsyncTask;
pub use executor::Executor;
pub use future::TaskFuture;
pub use graph::flow::{Flow, SubflowBuilder, Task};
pub use runtime::{PreemptionGuard, Runtime};

pub use weft_core::{IntoTaskParams, RuntimeError, TaskParams, TaskType};
