//! In-memory stand-ins for the row store and the remote system.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancellation::CancellationToken;
use crate::core::ImportRow;
use crate::errors::{RemoteError, RowStoreError};
use crate::ports::{ImportRowStore, RecordService, RemoteRecord, RemoteSystem, ServiceRegistry};

/// Builds `count` single-column rows numbered from 1, with values `R1`, `R2`, ...
#[must_use]
pub fn numbered_rows(count: u64) -> Vec<ImportRow> {
    (1..=count)
        .map(|n| ImportRow::new(n, vec![json!(format!("R{n}"))]))
        .collect()
}

/// A row store backed by vectors, with fetch counting and fault injection.
#[derive(Debug, Default)]
pub struct InMemoryRowStore {
    imports: RwLock<HashMap<String, Vec<ImportRow>>>,
    failing: RwLock<HashSet<String>>,
    fetches: AtomicUsize,
    cancel_after: Option<(usize, Arc<CancellationToken>)>,
    latency: Duration,
}

impl InMemoryRowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an import, builder style.
    #[must_use]
    pub fn with_import(self, import_id: impl Into<String>, rows: Vec<ImportRow>) -> Self {
        self.add_import(import_id, rows);
        self
    }

    /// Adds or replaces an import.
    pub fn add_import(&self, import_id: impl Into<String>, rows: Vec<ImportRow>) {
        self.imports.write().insert(import_id.into(), rows);
    }

    /// Makes every fetch of an import fail.
    #[must_use]
    pub fn with_failing_import(self, import_id: impl Into<String>) -> Self {
        self.failing.write().insert(import_id.into());
        self
    }

    /// Cancels `token` once `pages` fetches have been served.
    #[must_use]
    pub fn cancel_after_pages(mut self, pages: usize, token: Arc<CancellationToken>) -> Self {
        self.cancel_after = Some((pages, token));
        self
    }

    /// Delays every fetch.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the number of fetches served so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImportRowStore for InMemoryRowStore {
    async fn fetch_page(
        &self,
        import_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImportRow>, RowStoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.read().contains(import_id) {
            return Err(RowStoreError::Read {
                import: import_id.to_string(),
                message: "storage offline".to_string(),
            });
        }

        let page = {
            let imports = self.imports.read();
            let rows = imports
                .get(import_id)
                .ok_or_else(|| RowStoreError::UnknownImport(import_id.to_string()))?;
            rows.iter().skip(offset).take(limit).cloned().collect::<Vec<_>>()
        };

        let served = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((pages, token)) = &self.cancel_after {
            if served >= *pages {
                token.cancel("row store cancel trigger");
            }
        }
        Ok(page)
    }
}

/// The kind of a recorded service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOp {
    /// `find_by_id`
    FindById,
    /// `query`
    Query,
    /// `add`
    Add,
    /// `update`
    Update,
    /// `bulk_add`
    BulkAdd,
    /// `bulk_update`
    BulkUpdate,
    /// `execute`
    Execute,
}

/// One recorded call on an [`InMemoryRecordService`].
#[derive(Debug, Clone)]
pub struct ServiceCall {
    /// The operation.
    pub op: ServiceOp,
    /// Source ids of the records sent, when they carry one.
    pub source_ids: Vec<String>,
    /// Global call order across the service.
    pub sequence: u64,
    /// When the call started.
    pub at: Instant,
}

/// A record service storing records in memory, with a call log and
/// injectable failures.
///
/// A record's `source_id` is read from its body's `"source_id"` field.
#[derive(Debug)]
pub struct InMemoryRecordService {
    entity: String,
    records: RwLock<BTreeMap<String, RemoteRecord>>,
    calls: Mutex<Vec<ServiceCall>>,
    sequence: AtomicU64,
    next_id: AtomicU64,
    fail_bulk: AtomicBool,
    short_bulk: AtomicBool,
    failing_sources: RwLock<HashSet<String>>,
    latency: Duration,
}

fn source_id(record: &RemoteRecord) -> Option<String> {
    record
        .body
        .get("source_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl InMemoryRecordService {
    /// Creates an empty service for `entity`.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            records: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            fail_bulk: AtomicBool::new(false),
            short_bulk: AtomicBool::new(false),
            failing_sources: RwLock::new(HashSet::new()),
            latency: Duration::ZERO,
        }
    }

    /// Seeds a record that already exists remotely.
    #[must_use]
    pub fn with_record(self, id: impl Into<String>, body: Value) -> Self {
        let id = id.into();
        self.records
            .write()
            .insert(id.clone(), RemoteRecord::with_id(id, body));
        self
    }

    /// Makes every bulk call fail.
    #[must_use]
    pub fn with_failing_bulk(self) -> Self {
        self.fail_bulk.store(true, Ordering::SeqCst);
        self
    }

    /// Makes bulk calls drop the last result.
    #[must_use]
    pub fn with_short_bulk(self) -> Self {
        self.short_bulk.store(true, Ordering::SeqCst);
        self
    }

    /// Rejects every write of the record with this source id.
    #[must_use]
    pub fn with_failing_source(self, source_id: impl Into<String>) -> Self {
        self.failing_sources.write().insert(source_id.into());
        self
    }

    /// Delays every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the call log in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    /// Returns how many calls of `op` were made.
    #[must_use]
    pub fn count_of(&self, op: ServiceOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Returns the first write call carrying `source_id`.
    #[must_use]
    pub fn first_write_of(&self, source_id: &str) -> Option<ServiceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !matches!(c.op, ServiceOp::FindById | ServiceOp::Query | ServiceOp::Execute))
            .find(|c| c.source_ids.iter().any(|s| s == source_id))
            .cloned()
    }

    /// Returns a stored record by remote id.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<RemoteRecord> {
        self.records.read().get(id).cloned()
    }

    /// Returns the stored records whose body carries `source_id`.
    #[must_use]
    pub fn records_for_source(&self, source: &str) -> Vec<RemoteRecord> {
        self.records
            .read()
            .values()
            .filter(|r| source_id(r).as_deref() == Some(source))
            .cloned()
            .collect()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    async fn record_call(&self, op: ServiceOp, records: &[RemoteRecord]) {
        let call = ServiceCall {
            op,
            source_ids: records.iter().filter_map(source_id).collect(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            at: Instant::now(),
        };
        self.calls.lock().push(call);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn rejects(&self, record: &RemoteRecord) -> bool {
        source_id(record).is_some_and(|s| self.failing_sources.read().contains(&s))
    }

    fn rejected(&self, message: impl Into<String>) -> RemoteError {
        RemoteError::Rejected {
            entity: self.entity.clone(),
            message: message.into(),
        }
    }

    fn store_new(&self, record: RemoteRecord) -> String {
        let id = record.id.clone().unwrap_or_else(|| {
            format!("{}-{}", self.entity, self.next_id.fetch_add(1, Ordering::SeqCst))
        });
        self.records
            .write()
            .insert(id.clone(), RemoteRecord::with_id(id.clone(), record.body));
        id
    }

    fn store_existing(&self, record: RemoteRecord) -> Result<String, RemoteError> {
        let id = record
            .id
            .ok_or_else(|| self.rejected("update without an id"))?;
        let mut records = self.records.write();
        if !records.contains_key(&id) {
            return Err(self.rejected(format!("record '{id}' does not exist")));
        }
        records.insert(id.clone(), RemoteRecord::with_id(id.clone(), record.body));
        Ok(id)
    }

    fn check_bulk(&self, records: &[RemoteRecord]) -> Result<usize, RemoteError> {
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("bulk endpoint unavailable".to_string()));
        }
        if records.iter().any(|r| self.rejects(r)) {
            return Err(self.rejected("batch contains an invalid record"));
        }
        let keep = if self.short_bulk.load(Ordering::SeqCst) {
            records.len().saturating_sub(1)
        } else {
            records.len()
        };
        Ok(keep)
    }
}

#[async_trait]
impl RecordService for InMemoryRecordService {
    fn entity(&self) -> &str {
        &self.entity
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RemoteRecord>, RemoteError> {
        self.record_call(ServiceOp::FindById, &[]).await;
        Ok(self.record(id))
    }

    async fn query(&self, offset: usize, limit: usize) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.record_call(ServiceOp::Query, &[]).await;
        Ok(self
            .records
            .read()
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn add(&self, record: RemoteRecord) -> Result<String, RemoteError> {
        self.record_call(ServiceOp::Add, std::slice::from_ref(&record)).await;
        if self.rejects(&record) {
            return Err(self.rejected("record is invalid"));
        }
        Ok(self.store_new(record))
    }

    async fn update(&self, record: RemoteRecord) -> Result<String, RemoteError> {
        self.record_call(ServiceOp::Update, std::slice::from_ref(&record)).await;
        if self.rejects(&record) {
            return Err(self.rejected("record is invalid"));
        }
        self.store_existing(record)
    }

    async fn bulk_add(&self, records: Vec<RemoteRecord>) -> Result<Vec<String>, RemoteError> {
        self.record_call(ServiceOp::BulkAdd, &records).await;
        let keep = self.check_bulk(&records)?;
        Ok(records
            .into_iter()
            .take(keep)
            .map(|r| self.store_new(r))
            .collect())
    }

    async fn bulk_update(&self, records: Vec<RemoteRecord>) -> Result<Vec<String>, RemoteError> {
        self.record_call(ServiceOp::BulkUpdate, &records).await;
        let keep = self.check_bulk(&records)?;
        records
            .into_iter()
            .take(keep)
            .map(|r| self.store_existing(r))
            .collect()
    }

    async fn execute(&self, operation: &str, _args: Value) -> Result<Value, RemoteError> {
        self.record_call(ServiceOp::Execute, &[]).await;
        match operation {
            "count" => Ok(json!(self.len())),
            _ => Err(RemoteError::UnknownOperation {
                entity: self.entity.clone(),
                operation: operation.to_string(),
            }),
        }
    }
}

/// A remote system over a [`ServiceRegistry`] of in-memory services.
#[derive(Debug)]
pub struct InMemoryRemoteSystem {
    version: String,
    reachable: bool,
    services: ServiceRegistry,
    pings: AtomicUsize,
}

impl InMemoryRemoteSystem {
    /// Creates a reachable system reporting `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            reachable: true,
            services: ServiceRegistry::new(),
            pings: AtomicUsize::new(0),
        }
    }

    /// Makes the ping fail.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Registers a service.
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn RecordService>) -> Self {
        self.services.register(service);
        self
    }

    /// Returns how many times the system was pinged.
    #[must_use]
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSystem for InMemoryRemoteSystem {
    async fn ping(&self) -> Result<String, RemoteError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(self.version.clone())
        } else {
            Err(RemoteError::Unreachable("connection refused".to_string()))
        }
    }

    fn service(&self, entity: &str) -> Result<Arc<dyn RecordService>, RemoteError> {
        self.services.get(entity)
    }
}
