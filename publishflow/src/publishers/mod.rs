//! Ready-made publisher implementations.

mod mapped;

pub use mapped::{LookupSpec, MappedRecordPublisher, Reference, WriteMode};
