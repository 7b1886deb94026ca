//! One manifest entry.

use crate::core::DataSourceInstance;
use crate::publish::DataSourcePublisher;
use std::sync::Arc;

/// A data source type together with the instances configured for it.
#[derive(Debug, Clone)]
pub struct DataSourceType {
    name: String,
    dependencies: Vec<String>,
    publisher: Arc<dyn DataSourcePublisher>,
    instances: Vec<Arc<DataSourceInstance>>,
}

impl DataSourceType {
    /// Creates an entry with no instances.
    #[must_use]
    pub fn new(publisher: Arc<dyn DataSourcePublisher>) -> Self {
        Self {
            name: publisher.type_name().to_string(),
            dependencies: publisher.dependencies(),
            publisher,
            instances: Vec::new(),
        }
    }

    /// Adds an instance.
    pub fn push_instance(&mut self, instance: Arc<DataSourceInstance>) {
        self.instances.push(instance);
    }

    /// Adds an instance, builder style.
    #[must_use]
    pub fn with_instance(mut self, instance: DataSourceInstance) -> Self {
        self.push_instance(Arc::new(instance));
        self
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared dependency names, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the publisher implementing the type.
    #[must_use]
    pub fn publisher(&self) -> &Arc<dyn DataSourcePublisher> {
        &self.publisher
    }

    /// Returns the configured instances.
    #[must_use]
    pub fn instances(&self) -> &[Arc<DataSourceInstance>] {
        &self.instances
    }

    /// Returns the number of imports across all instances.
    #[must_use]
    pub fn import_count(&self) -> usize {
        self.instances.iter().map(|i| i.imports.len()).sum()
    }
}
