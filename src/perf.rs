//! Latency budgets for statusdex operations.
//!
//! Each hot path has a target, a warning threshold and a critical threshold.
//! [`Timer`] checks a measured duration against its budget and logs when the
//! warning threshold is crossed.
//!
//! | Tier | Target | Warning | Critical | Used for |
//! |------|--------|---------|----------|----------|
//! | Instant | 1ms | 5ms | 50ms | filter evaluation, lookups |
//! | Fast | 10ms | 50ms | 500ms | queries, matcher compilation |
//! | Normal | 100ms | 500ms | 5s | batch work |
//! | Slow | 1s | 5s | 30s | whole runs |

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Performance budget for an operation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub name: &'static str,
    /// Expected p99.
    pub target: Duration,
    pub warning: Duration,
    pub critical: Duration,
}

impl Budget {
    #[must_use]
    pub const fn new(name: &'static str, target_ms: u64, warning_ms: u64, critical_ms: u64) -> Self {
        Self {
            name,
            target: Duration::from_millis(target_ms),
            warning: Duration::from_millis(warning_ms),
            critical: Duration::from_millis(critical_ms),
        }
    }

    #[must_use]
    pub const fn instant(name: &'static str) -> Self {
        Self::new(name, 1, 5, 50)
    }

    #[must_use]
    pub const fn fast(name: &'static str) -> Self {
        Self::new(name, 10, 50, 500)
    }

    #[must_use]
    pub const fn normal(name: &'static str) -> Self {
        Self::new(name, 100, 500, 5000)
    }

    #[must_use]
    pub const fn slow(name: &'static str) -> Self {
        Self::new(name, 1000, 5000, 30000)
    }

    /// Where `duration` falls relative to this budget.
    #[must_use]
    pub fn status(&self, duration: Duration) -> BudgetStatus {
        if duration <= self.target {
            BudgetStatus::OnTarget
        } else if duration <= self.warning {
            BudgetStatus::Acceptable
        } else if duration <= self.critical {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Exceeded
        }
    }
}

/// Status of an operation relative to its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    OnTarget,
    Acceptable,
    Warning,
    Exceeded,
}

impl BudgetStatus {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::OnTarget | Self::Acceptable)
    }
}

// =============================================================================
// Filtering
// =============================================================================

/// One drop/hide decision with a warm matcher cache.
pub const FILTER_EVALUATE: Budget = Budget::instant("filter_evaluate");

/// Compiling the matcher pair for one rule set.
pub const FILTER_COMPILE: Budget = Budget::fast("filter_compile");

/// A whole timeline render pass.
pub const FILTER_TIMELINE: Budget = Budget::new("filter_timeline", 5, 20, 200);

// =============================================================================
// Search
// =============================================================================

/// One visibility-checked query.
pub const SEARCH_QUERY: Budget = Budget::fast("search_query");

// =============================================================================
// Indexing (per batch of up to 1000 posts)
// =============================================================================

/// Three bulk edge lookups for one batch.
pub const CRUTCH_LOAD: Budget = Budget::new("crutch_load", 20, 100, 1000);

/// Assembling documents for one batch.
pub const DOCUMENT_BUILD: Budget = Budget::new("document_build", 20, 100, 1000);

/// Upserting one batch into the index writer.
pub const INDEX_BATCH: Budget = Budget::new("index_batch", 50, 200, 2000);

/// Committing the index.
pub const INDEX_COMMIT: Budget = Budget::normal("index_commit");

/// A full indexing run.
pub const INDEX_FULL: Budget = Budget::slow("index_full");

// =============================================================================
// Storage
// =============================================================================

/// Importing an export file.
pub const IMPORT: Budget = Budget::slow("import");

/// Fetching a page of posts or a timeline.
pub const STORAGE_LOAD: Budget = Budget::fast("storage_load");

/// Measures an operation against a [`Budget`].
#[derive(Debug)]
pub struct Timer {
    budget: Budget,
    start: Instant,
}

impl Timer {
    #[must_use]
    pub fn start(budget: Budget) -> Self {
        Self {
            budget,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer, log the outcome and return the duration.
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        match self.budget.status(duration) {
            BudgetStatus::OnTarget | BudgetStatus::Acceptable => {
                debug!(operation = self.budget.name, duration_ms, "within budget");
            }
            BudgetStatus::Warning => {
                warn!(
                    operation = self.budget.name,
                    duration_ms,
                    warning_ms = u64::try_from(self.budget.warning.as_millis()).unwrap_or(u64::MAX),
                    "operation exceeded warning threshold"
                );
            }
            BudgetStatus::Exceeded => {
                warn!(
                    operation = self.budget.name,
                    duration_ms,
                    critical_ms = u64::try_from(self.budget.critical.as_millis()).unwrap_or(u64::MAX),
                    "operation exceeded critical threshold"
                );
            }
        }

        duration
    }
}

/// Time an expression against a budget.
#[macro_export]
macro_rules! timed {
    ($budget:expr, $expr:expr) => {{
        let timer = $crate::perf::Timer::start($budget);
        let result = $expr;
        timer.stop();
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_status() {
        let budget = Budget::new("test", 10, 50, 100);

        assert_eq!(budget.status(Duration::from_millis(5)), BudgetStatus::OnTarget);
        assert_eq!(budget.status(Duration::from_millis(30)), BudgetStatus::Acceptable);
        assert_eq!(budget.status(Duration::from_millis(75)), BudgetStatus::Warning);
        assert_eq!(budget.status(Duration::from_millis(150)), BudgetStatus::Exceeded);
    }

    #[test]
    fn test_budget_status_is_ok() {
        assert!(BudgetStatus::OnTarget.is_ok());
        assert!(BudgetStatus::Acceptable.is_ok());
        assert!(!BudgetStatus::Warning.is_ok());
        assert!(!BudgetStatus::Exceeded.is_ok());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start(Budget::slow("test"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }

    #[test]
    fn timed_returns_the_value() {
        let value = timed!(FILTER_EVALUATE, 2 + 2);
        assert_eq!(value, 4);
    }

    #[test]
    fn test_predefined_budgets() {
        let budgets = [
            FILTER_EVALUATE,
            FILTER_COMPILE,
            FILTER_TIMELINE,
            SEARCH_QUERY,
            CRUTCH_LOAD,
            DOCUMENT_BUILD,
            INDEX_BATCH,
            INDEX_COMMIT,
            INDEX_FULL,
            IMPORT,
            STORAGE_LOAD,
        ];

        for budget in budgets {
            assert!(budget.target < budget.warning, "{}", budget.name);
            assert!(budget.warning < budget.critical, "{}", budget.name);
        }
    }
}
