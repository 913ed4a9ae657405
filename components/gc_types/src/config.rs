//! Heap configuration.

use serde::{Deserialize, Serialize};

/// Default cap on pending decrements processed per collection cycle.
pub const DEFAULT_DECREMENT_BUDGET: usize = 512;

/// Tuning knobs for a thread's heap partition.
///
/// A config is fixed at bootstrap and applies to every cycle the owning
/// thread runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Maximum pending decrements processed per collection cycle; the
    /// remainder rolls into the next cycle.
    pub decrement_budget: usize,
    /// Write and verify canary words around every allocated entry.
    pub guard_mode: bool,
    /// Scan the native stack and machine registers for roots. When off,
    /// registered global spans are the only root source.
    pub scan_native_stack: bool,
    /// Print a stats summary to stderr after each cycle.
    pub verbose: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            decrement_budget: DEFAULT_DECREMENT_BUDGET,
            guard_mode: true,
            scan_native_stack: true,
            verbose: false,
        }
    }
}

impl HeapConfig {
    /// Config for embeddings that manage roots entirely through registered
    /// global spans. With native scanning off, root discovery sees exactly
    /// the registered words and collections are reproducible run to run.
    pub fn deterministic() -> Self {
        HeapConfig {
            scan_native_stack: false,
            ..HeapConfig::default()
        }
    }

    /// Returns a copy with a different decrement budget.
    pub fn with_decrement_budget(mut self, budget: usize) -> Self {
        self.decrement_budget = budget;
        self
    }

    /// Returns a copy with guard mode set.
    pub fn with_guard_mode(mut self, enabled: bool) -> Self {
        self.guard_mode = enabled;
        self
    }
}
