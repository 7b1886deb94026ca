//! Run mode and message severity enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which procedure a run (or a phase of a run) performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Check every row against business rules without writing anything.
    #[default]
    Validate,
    /// Validate, then write records to the remote system.
    Publish,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "Validate"),
            Self::Publish => write!(f, "Publish"),
        }
    }
}

/// Severity of a [`PublishMessage`](super::PublishMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Progress and summary information.
    Information,
    /// Something unexpected that did not fail the row.
    Warning,
    /// A row or run failure.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Information => write!(f, "Information"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
        }
    }
}
