//! The run manifest: configured data sources grouped by type and ordered
//! so that every type follows the types it depends on.

mod builder;
mod entry;
mod registry;

pub use builder::Manifest;
pub use entry::DataSourceType;
pub use registry::PublisherRegistry;
