//! Batch processing for one data source type.
//!
//! This module provides:
//! - The [`DataSourcePublisher`] trait implemented per record type
//! - The bounded worker pool used for batch dispatch
//! - The paged, batched type publisher pipeline
//! - Depth-ordered processing for self-referencing types
//! - Bulk writes with per-record fallback

mod hierarchy;
mod pool;
mod publisher;
mod type_publisher;
mod writer;

pub use hierarchy::{resolve_depth, DepthResolution, HierarchyReport, HierarchyResolver};
pub use pool::{BatchPool, PoolStats};
pub use publisher::DataSourcePublisher;
pub use type_publisher::TypePublisher;
pub use writer::{BulkWriter, PendingWrite, WriteOutcome, WriteReport};
