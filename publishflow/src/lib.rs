//! # Publishflow
//!
//! A dependency-ordered validate/publish pipeline that migrates imported
//! source records into a remote record service.
//!
//! A run groups the configured data source instances by type, orders the
//! types so that each follows the types it references, and then:
//!
//! - **Validates** every validatable type, batch by batch, collecting
//!   row-level errors without writing anything
//! - **Publishes** every type in the same order, but only when validation
//!   reported no errors
//! - **Resolves hierarchies** so parents are written before their children
//! - **Reports** progress and row-level outcomes through a message sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use publishflow::prelude::*;
//!
//! let registry = PublisherRegistry::new()
//!     .with_publisher(Arc::new(MappedRecordPublisher::new("Org", "Id").with_parent("Parent", "parent_id")))
//!     .with_publisher(Arc::new(
//!         MappedRecordPublisher::new("Person", "Id").with_reference(Reference::record("Org", "Org", "org_id")),
//!     ));
//!
//! let ctx = Arc::new(RunContext::new(PublishConfig::default().with_mode(RunMode::Publish), rows, remote));
//! let summary = PublishOrchestrator::new(registry).run(&ctx, instances).await;
//! assert!(summary.status.is_completed());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod manifest;
pub mod observability;
pub mod orchestrator;
pub mod ports;
pub mod publish;
pub mod publishers;
pub mod testing;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::cancellation::CancellationToken;
    pub use crate::config::PublishConfig;
    pub use crate::context::{RunContext, RunIdentity};
    pub use crate::core::{
        DataSourceInstance, GroupSuccess, HarvestedRecord, Import, ImportRow, PhaseOutcome,
        PublishMessage, RecordMap, RunMode, Severity,
    };
    pub use crate::errors::{
        CycleDetectedError, ManifestError, PublishError, RemoteError, RowStoreError,
    };
    pub use crate::events::{CollectingMessageSink, LoggingMessageSink, MessageSink};
    pub use crate::manifest::{DataSourceType, Manifest, PublisherRegistry};
    pub use crate::orchestrator::{PublishOrchestrator, RunStatus, RunSummary};
    pub use crate::ports::{ImportRowStore, RecordService, RemoteRecord, RemoteSystem};
    pub use crate::publish::{BulkWriter, DataSourcePublisher, HierarchyResolver, TypePublisher};
    pub use crate::publishers::{LookupSpec, MappedRecordPublisher, Reference, WriteMode};
    pub use crate::validation::{FieldError, RowValidator};
}
