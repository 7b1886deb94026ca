//! Core domain model types for publishflow.
//!
//! This module contains the value types shared by every pipeline component:
//! - Run mode and message severity enums
//! - Imports, rows and configured data source instances
//! - The run-scoped record map
//! - Per-phase outcome counters and log messages

mod message;
mod model;
mod outcome;
mod record_map;
mod status;

pub use message::PublishMessage;
pub use model::{DataSourceInstance, HarvestedRecord, Import, ImportRow, RowBatch};
pub use outcome::{format_elapsed, GroupSuccess, PhaseOutcome};
pub use record_map::{RecordMap, RecordMapEntry, UNRESOLVED_DEPTH};
pub use status::{RunMode, Severity};
