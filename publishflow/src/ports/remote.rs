//! Remote record service ports.

use crate::errors::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A record as exchanged with the remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// The remote id; `None` for records not yet inserted.
    pub id: Option<String>,
    /// The record body.
    pub body: Value,
}

impl RemoteRecord {
    /// Creates a record that has not been inserted yet.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self { id: None, body }
    }

    /// Creates a record with a known remote id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: Some(id.into()),
            body,
        }
    }
}

/// Typed access to one remote entity over an authenticated channel.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Returns the entity name this service serves.
    fn entity(&self) -> &str;

    /// Reads one record by remote id.
    async fn find_by_id(&self, id: &str) -> Result<Option<RemoteRecord>, RemoteError>;

    /// Reads one page of records.
    async fn query(&self, offset: usize, limit: usize) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Inserts one record and returns its remote id.
    async fn add(&self, record: RemoteRecord) -> Result<String, RemoteError>;

    /// Updates one record and returns its remote id.
    async fn update(&self, record: RemoteRecord) -> Result<String, RemoteError>;

    /// Inserts many records in one round trip, returning ids in input order.
    async fn bulk_add(&self, records: Vec<RemoteRecord>) -> Result<Vec<String>, RemoteError>;

    /// Updates many records in one round trip, returning ids in input order.
    async fn bulk_update(&self, records: Vec<RemoteRecord>) -> Result<Vec<String>, RemoteError>;

    /// Executes a named operation.
    async fn execute(&self, operation: &str, args: Value) -> Result<Value, RemoteError>;
}

/// The remote system as a whole.
#[async_trait]
pub trait RemoteSystem: Send + Sync {
    /// Checks connectivity and returns the remote version string.
    async fn ping(&self) -> Result<String, RemoteError>;

    /// Returns the service for an entity.
    fn service(&self, entity: &str) -> Result<Arc<dyn RecordService>, RemoteError>;
}

/// Explicit entity-name to service registry.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn RecordService>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under its entity name, replacing any previous one.
    pub fn register(&mut self, service: Arc<dyn RecordService>) {
        self.services
            .insert(service.entity().to_lowercase(), service);
    }

    /// Registers a service, builder style.
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn RecordService>) -> Self {
        self.register(service);
        self
    }

    /// Looks up the service for an entity, ignoring case.
    pub fn get(&self, entity: &str) -> Result<Arc<dyn RecordService>, RemoteError> {
        self.services
            .get(&entity.to_lowercase())
            .cloned()
            .ok_or_else(|| RemoteError::UnknownEntity(entity.to_string()))
    }

    /// Returns the registered entity names, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("entities", &self.entities())
            .finish()
    }
}
