//! Run identity for correlating publish runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one publish run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique id of this run.
    pub run_id: Uuid,
    /// The project whose data sources are being migrated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// The user who started the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a new identity with a generated run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project_id: None,
            user: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the project id.
    #[must_use]
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Sets the user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}
