//! Registry of known publisher implementations.

use crate::publish::DataSourcePublisher;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps data source type names to their publishers.
#[derive(Debug, Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<String, Arc<dyn DataSourcePublisher>>,
}

impl PublisherRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a publisher under its type name, replacing any previous one.
    pub fn register(&mut self, publisher: Arc<dyn DataSourcePublisher>) {
        self.publishers
            .insert(publisher.type_name().to_string(), publisher);
    }

    /// Registers a publisher, builder style.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn DataSourcePublisher>) -> Self {
        self.register(publisher);
        self
    }

    /// Returns the publisher for a type name.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn DataSourcePublisher>> {
        self.publishers.get(type_name).cloned()
    }

    /// Returns true if a publisher is registered for the type name.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.publishers.contains_key(type_name)
    }

    /// Returns the number of registered publishers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Returns the registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.publishers.keys().cloned().collect();
        names.sort();
        names
    }
}
