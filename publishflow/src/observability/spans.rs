//! Tracing spans for run phases.

use crate::core::RunMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::Span;
use uuid::Uuid;

/// Attributes of one (type, phase) processing unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpan {
    /// The run the phase belongs to.
    pub run_id: Uuid,
    /// Validate or publish.
    pub phase: RunMode,
    /// The data source type.
    pub type_name: String,
    /// Number of configured instances.
    pub instances: usize,
}

impl PhaseSpan {
    /// Creates span attributes.
    #[must_use]
    pub fn new(run_id: Uuid, phase: RunMode, type_name: impl Into<String>) -> Self {
        Self {
            run_id,
            phase,
            type_name: type_name.into(),
            instances: 0,
        }
    }

    /// Sets the instance count.
    #[must_use]
    pub fn with_instances(mut self, instances: usize) -> Self {
        self.instances = instances;
        self
    }

    /// Opens a `tracing` span carrying the attributes.
    #[must_use]
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "publish_phase",
            run_id = %self.run_id,
            phase = %self.phase,
            type_name = %self.type_name,
            instances = self.instances,
        )
    }

    /// Returns the attributes as flat key/value pairs.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        HashMap::from([
            ("run.id".to_string(), self.run_id.to_string()),
            ("phase".to_string(), self.phase.to_string()),
            ("type.name".to_string(), self.type_name.clone()),
            ("type.instances".to_string(), self.instances.to_string()),
        ])
    }
}
