//! Per-phase success and error tallies.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Running tally for one (type, phase) processing unit.
///
/// Both counters are monotonic. The stopwatch starts at construction.
#[derive(Debug)]
pub struct GroupSuccess {
    success: AtomicU64,
    errors: AtomicU64,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl GroupSuccess {
    /// Creates a new tally and starts its stopwatch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Records one success.
    pub fn success(&self) {
        self.add_success(1);
    }

    /// Records `count` successes.
    pub fn add_success(&self, count: u64) {
        self.success.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one error.
    pub fn error(&self) {
        self.add_error(1);
    }

    /// Records `count` errors.
    pub fn add_error(&self, count: u64) {
        self.errors.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of successes so far.
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    /// Returns the number of errors so far.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns true if any error has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Returns the wall-clock start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the time elapsed since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns the elapsed time as `d.hh:mm:ss`.
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed())
    }
}

impl Default for GroupSuccess {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a duration as `d.hh:mm:ss`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}.{hours:02}:{minutes:02}:{seconds:02}")
}

/// Result of a validate or publish procedure for one type.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// Whether the procedure reported success.
    pub success: bool,
    /// The tally collected during the procedure.
    pub group: Arc<GroupSuccess>,
}

impl PhaseOutcome {
    /// Builds an outcome whose success flag reflects the error count.
    #[must_use]
    pub fn from_group(group: Arc<GroupSuccess>) -> Self {
        Self {
            success: !group.has_errors(),
            group,
        }
    }

    /// Builds an explicitly failed outcome.
    #[must_use]
    pub fn failed(group: Arc<GroupSuccess>) -> Self {
        Self {
            success: false,
            group,
        }
    }

    /// Returns true if the outcome should block the publish phase.
    #[must_use]
    pub fn blocks_publish(&self) -> bool {
        !self.success || self.group.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counters_start_at_zero() {
        let group = GroupSuccess::new();
        assert_eq!(group.success_count(), 0);
        assert_eq!(group.error_count(), 0);
        assert!(!group.has_errors());
    }

    #[test]
    fn test_bulk_increments() {
        let group = GroupSuccess::new();
        group.success();
        group.add_success(4);
        group.add_error(2);
        assert_eq!(group.success_count(), 5);
        assert_eq!(group.error_count(), 2);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0.00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "0.00:00:59");
        assert_eq!(format_elapsed(Duration::from_secs(3_661)), "0.01:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(90_061)), "1.01:01:01");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments() {
        let group = Arc::new(GroupSuccess::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = group.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    group.success();
                    group.error();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(group.success_count(), 8000);
        assert_eq!(group.error_count(), 8000);
    }

    #[test]
    fn test_phase_outcome_blocks_publish() {
        let group = Arc::new(GroupSuccess::new());
        assert!(!PhaseOutcome::from_group(group.clone()).blocks_publish());
        group.error();
        assert!(PhaseOutcome::from_group(group.clone()).blocks_publish());
        assert!(PhaseOutcome::failed(Arc::new(GroupSuccess::new())).blocks_publish());
    }
}
