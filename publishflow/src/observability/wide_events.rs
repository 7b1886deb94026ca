//! Wide event emitter for run-level observability.

use crate::orchestrator::RunSummary;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Emits one comprehensive structured event per finished run.
#[derive(Debug, Clone)]
pub struct RunEventEmitter {
    /// Event type of run events.
    pub run_event_type: String,
}

impl Default for RunEventEmitter {
    fn default() -> Self {
        Self {
            run_event_type: "publish.run.wide".to_string(),
        }
    }
}

impl RunEventEmitter {
    /// Creates a new emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the payload of a run event.
    #[must_use]
    pub fn build_run_payload(summary: &RunSummary) -> Value {
        let mut phase_counts: BTreeMap<String, usize> = BTreeMap::new();
        for phase in &summary.phases {
            *phase_counts.entry(phase.phase.to_string()).or_default() += 1;
        }

        json!({
            "run_id": summary.run_id.to_string(),
            "mode": summary.mode,
            "status": summary.status.to_string(),
            "successes": summary.total_successes(),
            "errors": summary.total_errors(),
            "elapsed": summary.elapsed,
            "phase_counts": phase_counts,
            "phase_details": summary.phases,
        })
    }

    /// Emits the run event through `tracing`.
    pub fn emit_run_event(&self, summary: &RunSummary) {
        let payload = Self::build_run_payload(summary);
        info!(
            event_type = %self.run_event_type,
            run_id = %summary.run_id,
            payload = %payload,
            "Run finished"
        );
    }
}
