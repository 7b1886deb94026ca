//! Log messages emitted while validating and publishing.

use super::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event reported to the message sink.
///
/// Messages are immutable once created. `sequence` is stamped by the run
/// context when the message is emitted and increases strictly within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMessage {
    /// Message severity.
    pub severity: Severity,
    /// The data source type the message concerns.
    pub type_name: String,
    /// The data source instance, empty when not instance-specific.
    pub instance_name: String,
    /// The source row number, 0 when not row-specific.
    pub row_number: u64,
    /// Human readable text.
    pub text: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Emission order within the run.
    pub sequence: u64,
}

impl PublishMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(
        severity: Severity,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
        row_number: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            row_number,
            text: text.into(),
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// Creates an information message not tied to an instance or row.
    #[must_use]
    pub fn info(type_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Information, type_name, "", 0, text)
    }

    /// Creates an error message.
    #[must_use]
    pub fn error(
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
        row_number: u64,
        text: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, type_name, instance_name, row_number, text)
    }

    /// Sets the emission sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Returns true for error messages.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Returns true if the message refers to a specific row.
    #[must_use]
    pub fn is_row_specific(&self) -> bool {
        self.row_number > 0
    }
}
