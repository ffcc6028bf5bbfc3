//! Tracing macros for the weft runtime.
//!
//! Scheduler-heavy code paths fire very frequently, so every macro here is
//! target-scoped (filterable with `RUST_LOG=weft::scheduler=trace`) and can
//! be compiled out entirely with the `no-trace` feature for benchmark and
//! production builds. The macros expand to `tracing` events in the calling
//! crate; there is no runtime dispatch layer in between.

// ---- With tracing enabled (default) ----

/// Trace scheduler-level events (worker lifecycle, parking, stealing).
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! weft_sched {
    ($level:ident, worker = $worker:expr, $($arg:tt)*) => {
        tracing::$level!(target: "weft::scheduler", worker = $worker, $($arg)*)
    };
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "weft::scheduler", $($arg)*)
    }
}

/// Trace task dispatch, completion, and panic capture.
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! weft_task {
    ($level:ident, worker = $worker:expr, $($arg:tt)*) => {
        tracing::$level!(target: "weft::task", worker = $worker, $($arg)*)
    };
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "weft::task", $($arg)*)
    }
}

/// Trace topology lifecycle (start, re-run, cancellation, finalisation).
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! weft_topo {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "weft::topology", $($arg)*)
    }
}

// ---- With tracing disabled (no-trace feature) ----

/// Trace scheduler-level events - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! weft_sched {
    ($level:ident, worker = $worker:expr, $($arg:tt)*) => {};
    ($level:ident, $($arg:tt)*) => {};
}

/// Trace task events - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! weft_task {
    ($level:ident, worker = $worker:expr, $($arg:tt)*) => {};
    ($level:ident, $($arg:tt)*) => {};
}

/// Trace topology lifecycle - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! weft_topo {
    ($level:ident, $($arg:tt)*) => {};
}
