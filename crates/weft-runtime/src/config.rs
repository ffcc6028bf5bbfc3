//! Executor configuration.

use serde::{Deserialize, Serialize};
use weft_core::RuntimeError;

/// Configuration for an [`Executor`](crate::Executor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads. Zero selects the hardware concurrency
    /// reported by the operating system.
    pub num_workers: usize,
    /// How many full steal rounds (local pop, overflow drain, victim sweep)
    /// a worker attempts before parking on the notifier.
    pub steal_rounds_before_park: usize,
    /// How many times a single steal operation is retried when it loses a
    /// race with another thief.
    pub steal_retry_cap: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            steal_rounds_before_park: 4,
            steal_retry_cap: 2,
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with an explicit worker count.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    /// Sets the number of steal rounds before a worker parks.
    #[must_use]
    pub fn with_steal_rounds(mut self, rounds: usize) -> Self {
        self.steal_rounds_before_park = rounds;
        self
    }

    /// Sets the per-steal retry cap.
    #[must_use]
    pub fn with_steal_retry_cap(mut self, cap: usize) -> Self {
        self.steal_retry_cap = cap;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.steal_rounds_before_park == 0 {
            return Err(RuntimeError::InvalidConfig {
                message: "steal_rounds_before_park must be at least 1".into(),
            });
        }
        if self.steal_retry_cap == 0 {
            return Err(RuntimeError::InvalidConfig {
                message: "steal_retry_cap must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Resolves the effective worker count.
    pub(crate) fn resolved_workers(&self) -> usize {
        if self.num_workers > 0 {
            self.num_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = ExecutorConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.resolved_workers() >= 1);
    }

    #[test]
    fn rejects_zero_steal_rounds() {
        let cfg = ExecutorConfig::default().with_steal_rounds(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ExecutorConfig::with_workers(8).with_steal_retry_cap(3);
        let json = serde_json::to_string(&cfg).expect("serialize");
        let restored: ExecutorConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.num_workers, 8);
        assert_eq!(restored.steal_retry_cap, 3);
    }
}
