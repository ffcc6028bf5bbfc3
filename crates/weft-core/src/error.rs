//! Runtime errors.
//!
//! This module defines errors that surface from the task-graph runtime:
//! panics captured inside task bodies, configuration problems, and misuse of
//! worker-only entry points.

use thiserror::Error;

/// Errors produced by the weft runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A task body panicked; the payload is delivered through the topology
    /// future of the graph the task belonged to.
    #[error("task '{name}' panicked: {message}")]
    TaskPanic {
        /// Name of the task whose body panicked (may be empty for unnamed
        /// tasks).
        name: String,
        /// Stringified panic payload.
        message: String,
    },

    /// Invalid executor or scheduler configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected setting.
        message: String,
    },

    /// An operation that must run on a worker thread of the executor was
    /// invoked from a foreign thread.
    #[error("operation requires a worker thread of this executor")]
    NotAWorker,

    /// Work was submitted to an executor that is shutting down.
    #[error("executor is shut down")]
    Shutdown,
}

impl RuntimeError {
    /// Builds a [`RuntimeError::TaskPanic`] from a captured panic payload,
    /// downcasting the conventional `&str` / `String` payload types.
    pub fn from_panic(name: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        RuntimeError::TaskPanic {
            name: name.to_string(),
            message,
        }
    }
}
