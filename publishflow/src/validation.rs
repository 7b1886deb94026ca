//! Protocol for running a row validator.
//!
//! Rule definitions live outside the pipeline. A [`RowValidator`] receives a
//! row's mapped fields and returns field-level errors; the pipeline only
//! decides how those errors are reported and counted.

use crate::context::RunContext;
use crate::core::{Import, ImportRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The property that failed.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A business-rule engine for one data source type.
#[async_trait]
pub trait RowValidator: Send + Sync {
    /// Validates one row's mapped fields.
    async fn validate(&self, fields: &Map<String, Value>) -> Vec<FieldError>;
}

/// Runs `validator` against one row and logs every field error against it.
///
/// Returns true when the row is clean.
pub async fn run_row_validation(
    ctx: &RunContext,
    validator: &dyn RowValidator,
    type_name: &str,
    instance_name: &str,
    import: &Import,
    row: &ImportRow,
) -> bool {
    let fields = import.map_row(row);
    let errors = validator.validate(&fields).await;
    for error in &errors {
        ctx.error(type_name, instance_name, row.row_number, error.to_string())
            .await;
    }
    errors.is_empty()
}
