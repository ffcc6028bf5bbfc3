//! Shared foundation for the weft task-graph runtime.
//!
//! This crate carries the pieces every layer of the runtime needs without
//! pulling in the scheduler itself:
//! - `error`: the [`RuntimeError`](error::RuntimeError) enum returned by all
//!   fallible runtime APIs.
//! - `logging`: target-scoped tracing macros with a `no-trace` kill switch.
//! - `types`: task parameters and the public task-kind taxonomy.

pub mod error;
pub mod logging;
pub mod types;

pub use error::RuntimeError;
pub use types::{IntoTaskParams, TaskParams, TaskType};
