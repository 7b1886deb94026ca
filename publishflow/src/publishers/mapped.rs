//! A column-mapped publisher for record-per-row data source types.

use crate::context::RunContext;
use crate::core::{DataSourceInstance, GroupSuccess, Import, ImportRow, RecordMapEntry, RowBatch, RunMode};
use crate::errors::PublishError;
use crate::ports::RemoteRecord;
use crate::publish::{BulkWriter, DataSourcePublisher, PendingWrite};
use crate::validation::{run_row_validation, RowValidator};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether published rows create or update remote records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Rows become new records.
    #[default]
    Insert,
    /// Rows update the records whose remote id is the row key.
    Update,
}

/// A column whose value points at another record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A source id of another data source type, resolved through its record map.
    Record {
        /// The referencing column.
        column: String,
        /// The referenced type.
        type_name: String,
        /// The body field that receives the referenced target id.
        field: String,
    },
    /// A natural key resolved through a run-scoped lookup cache.
    Lookup {
        /// The referencing column.
        column: String,
        /// The lookup cache name.
        cache: String,
        /// The body field that receives the looked-up id.
        field: String,
    },
}

impl Reference {
    /// References a record of `type_name`.
    #[must_use]
    pub fn record(column: impl Into<String>, type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Record {
            column: column.into(),
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// References an entry of the lookup cache `cache`.
    #[must_use]
    pub fn lookup(column: impl Into<String>, cache: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Lookup {
            column: column.into(),
            cache: cache.into(),
            field: field.into(),
        }
    }

    fn column(&self) -> &str {
        match self {
            Self::Record { column, .. } | Self::Lookup { column, .. } => column,
        }
    }

    fn field(&self) -> &str {
        match self {
            Self::Record { field, .. } | Self::Lookup { field, .. } => field,
        }
    }

    fn resolve(&self, ctx: &RunContext, value: &str) -> Option<String> {
        match self {
            Self::Record { type_name, .. } => ctx.record_map(type_name).target_id(value),
            Self::Lookup { cache, .. } => ctx
                .lookup_cache(cache)
                .get(&value.to_lowercase())
                .map(|id| id.value().clone()),
        }
    }

    fn is_known(&self, ctx: &RunContext, value: &str) -> bool {
        match self {
            Self::Record { type_name, .. } => ctx.record_map(type_name).contains(value),
            Self::Lookup { cache, .. } => ctx.lookup_cache(cache).contains_key(&value.to_lowercase()),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Self::Record { type_name, .. } => type_name,
            Self::Lookup { cache, .. } => cache,
        }
    }
}

/// A lookup cache filled from a remote entity when the type is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSpec {
    /// The cache name.
    pub cache: String,
    /// The remote entity to read.
    pub entity: String,
    /// The body field holding the natural key.
    pub key_field: String,
}

impl LookupSpec {
    /// Creates a lookup cache description.
    #[must_use]
    pub fn new(cache: impl Into<String>, entity: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            cache: cache.into(),
            entity: entity.into(),
            key_field: key_field.into(),
        }
    }
}

/// Publishes one remote record per import row.
///
/// Every column is copied into the record body, plus `source_id` holding the
/// row key. With a parent column the type is hierarchical: the parent's
/// remote id is written to the parent field, and rows are published level by
/// level.
pub struct MappedRecordPublisher {
    type_name: String,
    entity: String,
    key_column: String,
    dependencies: Vec<String>,
    parent: Option<(String, String)>,
    validator: Option<Arc<dyn RowValidator>>,
    references: Vec<Reference>,
    lookups: Vec<LookupSpec>,
    write_mode: WriteMode,
    harvests: bool,
    validatable: bool,
}

impl MappedRecordPublisher {
    /// Creates a publisher writing `type_name` records keyed by `key_column`.
    #[must_use]
    pub fn new(type_name: impl Into<String>, key_column: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            entity: type_name.clone(),
            type_name,
            key_column: key_column.into(),
            dependencies: Vec::new(),
            parent: None,
            validator: None,
            references: Vec::new(),
            lookups: Vec::new(),
            write_mode: WriteMode::Insert,
            harvests: false,
            validatable: true,
        }
    }

    /// Sets the remote entity, when it differs from the type name.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Adds a type that must be published first.
    #[must_use]
    pub fn with_dependency(mut self, type_name: impl Into<String>) -> Self {
        self.dependencies.push(type_name.into());
        self
    }

    /// Makes the type hierarchical through `column`, written to `field`.
    #[must_use]
    pub fn with_parent(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.parent = Some((column.into(), field.into()));
        self
    }

    /// Sets the row validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn RowValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Adds a reference column. Referenced record types become dependencies.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        if let Reference::Record { type_name, .. } = &reference {
            if !self.dependencies.contains(type_name) {
                self.dependencies.push(type_name.clone());
            }
        }
        self.references.push(reference);
        self
    }

    /// Adds a lookup cache to fill on initialization.
    #[must_use]
    pub fn with_lookup(mut self, lookup: LookupSpec) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Sets the write mode.
    #[must_use]
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Reconciles harvested records when publishing.
    #[must_use]
    pub fn harvesting(mut self) -> Self {
        self.harvests = true;
        self
    }

    /// Excludes the type from the validate phase.
    #[must_use]
    pub fn not_validatable(mut self) -> Self {
        self.validatable = false;
        self
    }

    fn parent_of(&self, import: &Import, row: &ImportRow) -> Option<String> {
        self.parent
            .as_ref()
            .and_then(|(column, _)| import.text(row, column))
    }

    async fn validate_row(
        &self,
        ctx: &RunContext,
        instance: &DataSourceInstance,
        import: &Import,
        row: &ImportRow,
    ) -> bool {
        let Some(key) = import.text(row, &self.key_column) else {
            ctx.error(
                &self.type_name,
                &instance.name,
                row.row_number,
                format!("Missing value for key column '{}'", self.key_column),
            )
            .await;
            return false;
        };

        let mut clean = true;
        if let Some(validator) = &self.validator {
            clean &= run_row_validation(ctx, validator.as_ref(), &self.type_name, &instance.name, import, row).await;
        }

        for reference in &self.references {
            let Some(value) = import.text(row, reference.column()) else {
                continue;
            };
            if !reference.is_known(ctx, &value) {
                ctx.error(
                    &self.type_name,
                    &instance.name,
                    row.row_number,
                    format!("{}: '{value}' was not found in {}", reference.column(), reference.describe()),
                )
                .await;
                clean = false;
            }
        }

        let entry = RecordMapEntry::new(key.clone(), row.row_number)
            .with_related(self.parent_of(import, row))
            .with_instance(instance.name.clone())
            .rejected(!clean);
        if !ctx.record_map(&self.type_name).insert(entry) {
            ctx.error(
                &self.type_name,
                &instance.name,
                row.row_number,
                format!("Duplicate record '{key}'"),
            )
            .await;
            clean = false;
        }
        clean
    }

    fn prepare_write(
        &self,
        ctx: &RunContext,
        instance: &DataSourceInstance,
        import: &Import,
        row: &ImportRow,
    ) -> Result<Option<PendingWrite>, String> {
        let key = import
            .text(row, &self.key_column)
            .ok_or_else(|| format!("Missing value for key column '{}'", self.key_column))?;

        let map = ctx.record_map(&self.type_name);
        if map.get(&key).is_some_and(|entry| entry.external) {
            return Ok(None);
        }

        let mut body: Map<String, Value> = import.map_row(row);
        body.insert("source_id".to_string(), json!(key));

        if let (Some(parent), Some((_, field))) = (self.parent_of(import, row), &self.parent) {
            let target = map
                .target_id(&parent)
                .ok_or_else(|| format!("Parent '{parent}' of '{key}' has no remote id"))?;
            body.insert(field.clone(), json!(target));
        }

        for reference in &self.references {
            let Some(value) = import.text(row, reference.column()) else {
                continue;
            };
            let target = reference
                .resolve(ctx, &value)
                .ok_or_else(|| format!("{}: '{value}' has no remote id", reference.column()))?;
            body.insert(reference.field().to_string(), json!(target));
        }

        let record = match self.write_mode {
            WriteMode::Insert => RemoteRecord::new(Value::Object(body)),
            WriteMode::Update => RemoteRecord::with_id(key.clone(), Value::Object(body)),
        };
        debug!(type_name = %self.type_name, instance = %instance.name, key = %key, "Record mapped");
        Ok(Some(PendingWrite::new(row.row_number, key, record)))
    }

    async fn publish_batch(
        &self,
        ctx: &RunContext,
        instance: &DataSourceInstance,
        import: &Import,
        batch: RowBatch,
        outcome: &GroupSuccess,
    ) {
        let service = match ctx.remote().service(&self.entity) {
            Ok(service) => service,
            Err(e) => {
                for row in &batch {
                    ctx.error(&self.type_name, &instance.name, row.row_number, e.to_string())
                        .await;
                }
                outcome.add_error(batch.len() as u64);
                return;
            }
        };

        let mut writes = Vec::with_capacity(batch.len());
        for row in &batch {
            match self.prepare_write(ctx, instance, import, row) {
                Ok(Some(write)) => writes.push(write),
                Ok(None) => outcome.success(),
                Err(message) => {
                    ctx.error(&self.type_name, &instance.name, row.row_number, message)
                        .await;
                    outcome.error();
                }
            }
        }

        let report = BulkWriter::new(ctx, &self.type_name, &instance.name)
            .write_batch(service.as_ref(), writes, self.write_mode == WriteMode::Insert)
            .await;

        let map = ctx.record_map(&self.type_name);
        for written in report.outcomes {
            match written.target_id {
                Some(target) if written.error.is_none() => {
                    map.insert(
                        RecordMapEntry::new(written.source_id.clone(), written.row_number)
                            .with_instance(instance.name.clone()),
                    );
                    map.set_target_id(&written.source_id, target);
                    outcome.success();
                }
                _ => outcome.error(),
            }
        }
    }
}

impl fmt::Debug for MappedRecordPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRecordPublisher")
            .field("type_name", &self.type_name)
            .field("entity", &self.entity)
            .field("key_column", &self.key_column)
            .field("dependencies", &self.dependencies)
            .field("parent", &self.parent)
            .field("has_validator", &self.validator.is_some())
            .field("references", &self.references)
            .field("lookups", &self.lookups)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

#[async_trait]
impl DataSourcePublisher for MappedRecordPublisher {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn is_validatable(&self) -> bool {
        self.validatable
    }

    fn harvests(&self) -> bool {
        self.harvests
    }

    fn is_hierarchical(&self) -> bool {
        self.parent.is_some()
    }

    fn record_key(&self, import: &Import, row: &ImportRow) -> Option<String> {
        import.text(row, &self.key_column)
    }

    fn validator(&self) -> Option<Arc<dyn RowValidator>> {
        self.validator.clone()
    }

    async fn initialize(&self, ctx: &RunContext) -> Result<(), PublishError> {
        let page_size = ctx.config().page_size.max(1);
        for lookup in &self.lookups {
            let service = ctx.remote().service(&lookup.entity)?;
            let cache = ctx.lookup_cache(&lookup.cache);
            let mut offset = 0;
            loop {
                let page = service.query(offset, page_size).await?;
                let fetched = page.len();
                for record in page {
                    let key = record.body.get(&lookup.key_field).and_then(Value::as_str);
                    if let (Some(key), Some(id)) = (key, record.id) {
                        cache.insert(key.to_lowercase(), id);
                    }
                }
                offset += fetched;
                if fetched < page_size {
                    break;
                }
            }
            debug!(type_name = %self.type_name, cache = %lookup.cache, entries = cache.len(), "Lookup cache warmed");
        }
        Ok(())
    }

    async fn process_batch(
        &self,
        ctx: &Arc<RunContext>,
        mode: RunMode,
        instance: &DataSourceInstance,
        import: &Import,
        batch: RowBatch,
        outcome: &GroupSuccess,
    ) {
        match mode {
            RunMode::Validate => {
                let hierarchical = self.is_hierarchical();
                for row in &batch {
                    if !self.validate_row(ctx, instance, import, row).await {
                        outcome.error();
                    } else if !hierarchical {
                        // Hierarchical rows count once their depth is assigned.
                        outcome.success();
                    }
                }
            }
            RunMode::Publish => self.publish_batch(ctx, instance, import, batch, outcome).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishConfig;
    use crate::events::CollectingMessageSink;
    use crate::manifest::DataSourceType;
    use crate::testing::{
        InMemoryRecordService, InMemoryRemoteSystem, InMemoryRowStore, RequiredFields, ServiceOp,
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        ctx: Arc<RunContext>,
        sink: Arc<CollectingMessageSink>,
        service: Arc<InMemoryRecordService>,
    }

    fn fixture(rows: InMemoryRowStore, service: InMemoryRecordService) -> Fixture {
        let sink = Arc::new(CollectingMessageSink::new());
        let service = Arc::new(service);
        let remote = InMemoryRemoteSystem::new("1.0")
            .with_service(service.clone())
            .with_service(Arc::new(
                InMemoryRecordService::new("Group")
                    .with_record("G-7", json!({"code": "Board"})),
            ));
        let ctx = Arc::new(
            RunContext::new(
                PublishConfig::default().with_batch_size(2),
                Arc::new(rows),
                Arc::new(remote),
            )
            .with_sink(sink.clone()),
        );
        Fixture { ctx, sink, service }
    }

    fn people_import() -> Import {
        Import::new("people", vec!["Id".into(), "Name".into(), "Group".into()])
    }

    fn person(row: u64, id: &str, name: &str, group: &str) -> ImportRow {
        ImportRow::new(row, vec![json!(id), json!(name), json!(group)])
    }

    fn entry(publisher: MappedRecordPublisher, import: Import) -> DataSourceType {
        DataSourceType::new(Arc::new(publisher))
            .with_instance(DataSourceInstance::new("people", "Party").with_import(import))
    }

    #[tokio::test]
    async fn test_validate_reports_duplicates_and_rule_failures() {
        let rows = InMemoryRowStore::new().with_import(
            "people",
            vec![
                person(1, "P1", "Ann", ""),
                person(2, "p1", "Dup", ""),
                person(3, "P2", "", ""),
            ],
        );
        let f = fixture(rows, InMemoryRecordService::new("Party"));
        let publisher = MappedRecordPublisher::new("Party", "Id")
            .with_validator(Arc::new(RequiredFields::new(["Name"])));
        let entry = entry(publisher, people_import());

        let outcome = entry.publisher().validate(&f.ctx, &entry).await.unwrap();

        assert_eq!(outcome.group.success_count(), 1);
        assert_eq!(outcome.group.error_count(), 2);
        // P1 and p1 share a batch, so the first row wins.
        assert_eq!(f.sink.first_containing("Duplicate record 'p1'").unwrap().row_number, 2);
        assert_eq!(f.sink.first_containing("Name: is required").unwrap().row_number, 3);
        assert_eq!(f.ctx.record_map("Party").len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_cache_is_warmed_and_used() {
        let rows = InMemoryRowStore::new().with_import(
            "people",
            vec![person(1, "P1", "Ann", "board"), person(2, "P2", "Bob", "choir")],
        );
        let f = fixture(rows, InMemoryRecordService::new("Party"));
        let publisher = MappedRecordPublisher::new("Party", "Id")
            .with_lookup(LookupSpec::new("groups", "Group", "code"))
            .with_reference(Reference::lookup("Group", "groups", "group_id"));
        publisher.initialize(&f.ctx).await.unwrap();
        let entry = entry(publisher, people_import());

        let validated = entry.publisher().validate(&f.ctx, &entry).await.unwrap();
        assert_eq!(validated.group.error_count(), 1);
        assert!(f.sink.first_containing("'choir' was not found in groups").is_some());

        let published = entry.publisher().publish(&f.ctx, &entry).await.unwrap();
        // P2 fails again at publish time because its group has no id.
        assert_eq!(published.group.success_count(), 1);
        let stored = f.service.records_for_source("P1");
        assert_eq!(stored[0].body["group_id"], json!("G-7"));
    }

    #[tokio::test]
    async fn test_publish_writes_and_records_target_ids() {
        let rows = InMemoryRowStore::new().with_import(
            "people",
            vec![person(1, "P1", "Ann", ""), person(2, "P2", "Bob", ""), person(3, "P3", "Cy", "")],
        );
        let f = fixture(rows, InMemoryRecordService::new("Party"));
        let entry = entry(MappedRecordPublisher::new("Party", "Id"), people_import());

        entry.publisher().validate(&f.ctx, &entry).await.unwrap();
        let outcome = entry.publisher().publish(&f.ctx, &entry).await.unwrap();

        assert_eq!(outcome.group.success_count(), 3);
        // Batches of 2 and 1.
        assert_eq!(f.service.count_of(ServiceOp::BulkAdd), 2);
        let map = f.ctx.record_map("Party");
        for source in ["P1", "P2", "P3"] {
            let target = map.target_id(source).unwrap();
            assert_eq!(f.service.record(&target).unwrap().body["source_id"], json!(source));
        }
    }

    #[tokio::test]
    async fn test_hierarchy_writes_parents_first() {
        let rows = InMemoryRowStore::new().with_import(
            "orgs",
            vec![
                ImportRow::new(1, vec![json!("team"), json!("dept")]),
                ImportRow::new(2, vec![json!("dept"), json!("hq")]),
                ImportRow::new(3, vec![json!("hq"), Value::Null]),
                ImportRow::new(4, vec![json!("annex"), json!("legacy")]),
            ],
        );
        let f = fixture(rows, InMemoryRecordService::new("Org").with_record("legacy", json!({})));
        let publisher = MappedRecordPublisher::new("Org", "Id").with_parent("Parent", "parent_id");
        let entry = DataSourceType::new(Arc::new(publisher)).with_instance(
            DataSourceInstance::new("orgs", "Org")
                .with_import(Import::new("orgs", vec!["Id".into(), "Parent".into()])),
        );

        let validated = entry.publisher().validate(&f.ctx, &entry).await.unwrap();
        assert!(validated.success, "{:?}", f.sink.errors());
        let map = f.ctx.record_map("Org");
        assert_eq!(map.depth("team"), Some(2));
        assert_eq!(map.depth("annex"), Some(1));

        let published = entry.publisher().publish(&f.ctx, &entry).await.unwrap();
        assert_eq!(published.group.success_count(), 4);

        let hq = map.target_id("hq").unwrap();
        let dept = map.target_id("dept").unwrap();
        assert_eq!(f.service.record(&dept).unwrap().body["parent_id"], json!(hq));
        let team = map.target_id("team").unwrap();
        assert_eq!(f.service.record(&team).unwrap().body["parent_id"], json!(dept));
        let annex = map.target_id("annex").unwrap();
        assert_eq!(f.service.record(&annex).unwrap().body["parent_id"], json!("legacy"));
        let written = |source: &str| f.service.first_write_of(source).unwrap().sequence;
        assert!(written("hq") < written("dept"));
        assert!(written("dept") < written("team"));
    }

    #[tokio::test]
    async fn test_hierarchy_counts_each_row_once() {
        let org = |row: u64, id: &str, parent: Option<&str>, name: &str| {
            ImportRow::new(row, vec![json!(id), parent.map_or(Value::Null, |p| json!(p)), json!(name)])
        };
        let rows = InMemoryRowStore::new().with_import(
            "orgs",
            vec![
                org(1, "root", None, "Root"),
                org(2, "child", Some("root"), "Child"),
                org(3, "orphan", Some("ghost"), "Orphan"),
                org(4, "x", Some("y"), "X"),
                org(5, "y", Some("x"), "Y"),
                org(6, "blank", Some("ghost"), ""),
            ],
        );
        let f = fixture(rows, InMemoryRecordService::new("Org"));
        let publisher = MappedRecordPublisher::new("Org", "Id")
            .with_parent("Parent", "parent_id")
            .with_validator(Arc::new(RequiredFields::new(["Name"])));
        let entry = DataSourceType::new(Arc::new(publisher)).with_instance(
            DataSourceInstance::new("orgs", "Org").with_import(Import::new(
                "orgs",
                vec!["Id".into(), "Parent".into(), "Name".into()],
            )),
        );

        let outcome = entry.publisher().validate(&f.ctx, &entry).await.unwrap();

        let group = &outcome.group;
        assert_eq!(group.success_count(), 2);
        assert_eq!(group.error_count(), 4);
        assert_eq!(group.success_count() + group.error_count(), 6);
        assert!(!outcome.success);
        assert!(f.sink.first_containing("Parent 'ghost' of 'orphan'").is_some());
        assert!(f.sink.first_containing("Circular hierarchy detected for 'x'").is_some());
    }

    #[tokio::test]
    async fn test_update_mode_targets_existing_records() {
        let rows = InMemoryRowStore::new().with_import("people", vec![person(1, "R1", "Ann", "")]);
        let f = fixture(rows, InMemoryRecordService::new("Party").with_record("R1", json!({"Name": "old"})));
        let entry = entry(
            MappedRecordPublisher::new("Party", "Id").with_write_mode(WriteMode::Update),
            people_import(),
        );

        entry.publisher().validate(&f.ctx, &entry).await.unwrap();
        entry.publisher().publish(&f.ctx, &entry).await.unwrap();

        assert_eq!(f.service.count_of(ServiceOp::BulkUpdate), 1);
        assert_eq!(f.service.record("R1").unwrap().body["Name"], json!("Ann"));
        assert_eq!(f.ctx.record_map("Party").target_id("R1").as_deref(), Some("R1"));
    }

    #[test]
    fn test_record_reference_adds_dependency() {
        let publisher = MappedRecordPublisher::new("Membership", "Id")
            .with_reference(Reference::record("Person", "Party", "party_id"))
            .with_reference(Reference::record("Sponsor", "Party", "sponsor_id"));
        assert_eq!(publisher.dependencies(), vec!["Party".to_string()]);
        assert!(!publisher.is_hierarchical());
    }
}
