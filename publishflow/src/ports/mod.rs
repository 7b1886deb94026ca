//! Ports to the collaborators the pipeline depends on.
//!
//! The pipeline never talks HTTP or SQL itself. It reaches the remote record
//! service through [`RemoteSystem`] / [`RecordService`] and reads persisted
//! import rows through [`ImportRowStore`].

mod remote;
mod rows;

pub use remote::{RecordService, RemoteRecord, RemoteSystem, ServiceRegistry};
pub use rows::ImportRowStore;
