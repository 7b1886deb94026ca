//! Testing utilities for publish runs.
//!
//! This module provides:
//! - In-memory row store, record services and remote system
//! - Recording publishers and simple validators
//! - Assertions over emitted messages

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_emitted_before, assert_message, assert_no_errors, assert_no_message};
pub use fixtures::{
    numbered_rows, InMemoryRecordService, InMemoryRemoteSystem, InMemoryRowStore, ServiceCall,
    ServiceOp,
};
pub use mocks::{BatchRecord, RecordingPublisher, RequiredFields};
