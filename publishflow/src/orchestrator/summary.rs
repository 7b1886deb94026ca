//! Run results reported to the host.

use crate::core::{PhaseOutcome, RunMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum RunStatus {
    /// Every requested phase ran.
    Completed,
    /// Validation reported errors, so publishing was skipped.
    Aborted,
    /// Cancellation was requested.
    Cancelled,
    /// A run-fatal error stopped the run.
    Failed(String),
}

impl RunStatus {
    /// Returns true for [`RunStatus::Completed`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Tally of one (type, phase) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// The data source type.
    pub type_name: String,
    /// Validate or publish.
    pub phase: RunMode,
    /// Whether the procedure reported success.
    pub success: bool,
    /// Rows (or records) processed successfully.
    pub successes: u64,
    /// Errors counted.
    pub errors: u64,
    /// Elapsed time as `d.hh:mm:ss`.
    pub elapsed: String,
}

impl PhaseSummary {
    /// Captures the counters of a finished phase.
    #[must_use]
    pub fn new(type_name: impl Into<String>, phase: RunMode, outcome: &PhaseOutcome) -> Self {
        Self {
            type_name: type_name.into(),
            phase,
            success: outcome.success,
            successes: outcome.group.success_count(),
            errors: outcome.group.error_count(),
            elapsed: outcome.group.elapsed_display(),
        }
    }
}

/// Everything a host learns about a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The run id.
    pub run_id: Uuid,
    /// The requested mode.
    pub mode: RunMode,
    /// How the run ended.
    pub status: RunStatus,
    /// One entry per phase that ran, in execution order.
    pub phases: Vec<PhaseSummary>,
    /// Total elapsed time as `d.hh:mm:ss`.
    pub elapsed: String,
}

impl RunSummary {
    /// Returns the total successes across phases.
    #[must_use]
    pub fn total_successes(&self) -> u64 {
        self.phases.iter().map(|p| p.successes).sum()
    }

    /// Returns the total errors across phases.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.phases.iter().map(|p| p.errors).sum()
    }

    /// Returns the summary of one phase of one type.
    #[must_use]
    pub fn phase(&self, type_name: &str, phase: RunMode) -> Option<&PhaseSummary> {
        self.phases
            .iter()
            .find(|p| p.type_name == type_name && p.phase == phase)
    }

    /// Returns the types that ran `phase`, in execution order.
    #[must_use]
    pub fn types_in(&self, phase: RunMode) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|p| p.phase == phase)
            .map(|p| p.type_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GroupSuccess;
    use std::sync::Arc;

    #[test]
    fn test_totals_and_lookup() {
        let group = Arc::new(GroupSuccess::new());
        group.add_success(4);
        group.error();
        let outcome = PhaseOutcome::from_group(group);

        let summary = RunSummary {
            run_id: Uuid::new_v4(),
            mode: RunMode::Publish,
            status: RunStatus::Aborted,
            phases: vec![
                PhaseSummary::new("Party", RunMode::Validate, &outcome),
                PhaseSummary::new("Event", RunMode::Validate, &outcome),
            ],
            elapsed: "0.00:00:01".into(),
        };

        assert_eq!(summary.total_successes(), 8);
        assert_eq!(summary.total_errors(), 2);
        assert!(!summary.phase("Party", RunMode::Validate).unwrap().success);
        assert!(summary.phase("Party", RunMode::Publish).is_none());
        assert_eq!(summary.types_in(RunMode::Validate), vec!["Party", "Event"]);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(RunStatus::Failed("remote unreachable".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "remote unreachable"}));
        assert_eq!(RunStatus::Cancelled.to_string(), "cancelled");
    }
}
