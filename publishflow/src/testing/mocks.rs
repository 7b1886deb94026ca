//! Mock publishers and validators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::RunContext;
use crate::core::{
    DataSourceInstance, GroupSuccess, Import, ImportRow, PhaseOutcome, RecordMapEntry, RowBatch, RunMode,
};
use crate::errors::PublishError;
use crate::manifest::DataSourceType;
use crate::publish::{DataSourcePublisher, HierarchyResolver, TypePublisher};
use crate::validation::{FieldError, RowValidator};

/// One batch seen by a [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct BatchRecord {
    /// The mode the batch ran in.
    pub mode: RunMode,
    /// The instance name.
    pub instance: String,
    /// The import id.
    pub import: String,
    /// Row numbers in processing order.
    pub rows: Vec<u64>,
    /// When the handler started.
    pub started: Instant,
    /// When the handler finished.
    pub finished: Instant,
}

/// A publisher that records every batch it processes.
///
/// Every row succeeds unless it is listed in [`failing_rows`](Self::failing_rows),
/// in which case validation logs an error against it. A hierarchical
/// publisher records validated rows as roots in the type's record map.
#[derive(Debug)]
pub struct RecordingPublisher {
    type_name: String,
    dependencies: Vec<String>,
    validatable: bool,
    harvests: bool,
    key_column: Option<String>,
    failing_rows: HashSet<u64>,
    failure: Option<String>,
    panics: bool,
    batch_delay: Duration,
    init_calls: AtomicUsize,
    batches: Mutex<Vec<BatchRecord>>,
}

impl RecordingPublisher {
    /// Creates a publisher for `type_name`.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            dependencies: Vec::new(),
            validatable: true,
            harvests: false,
            key_column: None,
            failing_rows: HashSet::new(),
            failure: None,
            panics: false,
            batch_delay: Duration::ZERO,
            init_calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, type_name: impl Into<String>) -> Self {
        self.dependencies.push(type_name.into());
        self
    }

    /// Excludes the type from the validate phase.
    #[must_use]
    pub fn not_validatable(mut self) -> Self {
        self.validatable = false;
        self
    }

    /// Reconciles harvested records when publishing.
    #[must_use]
    pub fn harvesting(mut self) -> Self {
        self.harvests = true;
        self
    }

    /// Marks the type hierarchical, keyed by `key_column`.
    #[must_use]
    pub fn hierarchical(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = Some(key_column.into());
        self
    }

    /// Rejects these rows during validation.
    #[must_use]
    pub fn failing_rows(mut self, rows: impl IntoIterator<Item = u64>) -> Self {
        self.failing_rows = rows.into_iter().collect();
        self
    }

    /// Makes `validate` return an unexpected error once its batches ran.
    #[must_use]
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Makes `validate` panic once its batches ran.
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Sleeps in every batch before handling rows.
    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Returns how many times `initialize` ran.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Returns every recorded batch in completion order.
    #[must_use]
    pub fn batches(&self) -> Vec<BatchRecord> {
        self.batches.lock().clone()
    }

    /// Returns the sizes of the batches processed in `mode`.
    #[must_use]
    pub fn batch_sizes(&self, mode: RunMode) -> Vec<usize> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.mode == mode)
            .map(|b| b.rows.len())
            .collect()
    }

    /// Returns the sorted row numbers processed in `mode`.
    #[must_use]
    pub fn rows_processed(&self, mode: RunMode) -> Vec<u64> {
        let mut rows: Vec<u64> = self
            .batches
            .lock()
            .iter()
            .filter(|b| b.mode == mode)
            .flat_map(|b| b.rows.iter().copied())
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Returns when the first batch in `mode` started.
    #[must_use]
    pub fn first_started(&self, mode: RunMode) -> Option<Instant> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.mode == mode)
            .map(|b| b.started)
            .min()
    }

    /// Returns when the last batch in `mode` finished.
    #[must_use]
    pub fn last_finished(&self, mode: RunMode) -> Option<Instant> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.mode == mode)
            .map(|b| b.finished)
            .max()
    }
}

#[async_trait]
impl DataSourcePublisher for RecordingPublisher {
    fn type_name(&self) -> &str {
        &self.type_name
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
        self.key_column.is_some()
    }

    fn record_key(&self, import: &Import, row: &ImportRow) -> Option<String> {
        self.key_column
            .as_deref()
            .and_then(|column| import.text(row, column))
    }

    async fn initialize(&self, _ctx: &RunContext) -> Result<(), PublishError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
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
        let started = Instant::now();
        if !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }

        let mut rows = Vec::with_capacity(batch.len());
        let map = ctx.record_map(&self.type_name);
        for row in batch {
            let rejected = mode == RunMode::Validate && self.failing_rows.contains(&row.row_number);
            if rejected {
                ctx.error(&self.type_name, &instance.name, row.row_number, "Row rejected")
                    .await;
                outcome.error();
            }
            let recorded = match (mode, self.record_key(import, &row)) {
                (RunMode::Validate, Some(key)) => {
                    map.insert(
                        RecordMapEntry::new(key, row.row_number)
                            .with_instance(instance.name.clone())
                            .rejected(rejected),
                    );
                    true
                }
                _ => false,
            };
            // Recorded rows count when their depth is assigned.
            if !rejected && !recorded {
                outcome.success();
            }
            rows.push(row.row_number);
        }

        self.batches.lock().push(BatchRecord {
            mode,
            instance: instance.name.clone(),
            import: import.id.clone(),
            rows,
            started,
            finished: Instant::now(),
        });
    }

    async fn validate(
        &self,
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        let phase = TypePublisher::run(ctx, RunMode::Validate, entry).await?;
        if let Some(message) = &self.failure {
            return Err(anyhow::anyhow!("{message}")
                .context(format!("{} validation crashed", self.type_name))
                .into());
        }
        if self.panics {
            panic!("{} validation panicked", self.type_name);
        }
        if self.is_hierarchical() && !ctx.is_cancelled() {
            HierarchyResolver::link_external_parents(ctx, entry).await;
            HierarchyResolver::assign_depths(ctx, entry, &phase.group).await;
            return Ok(PhaseOutcome::from_group(phase.group));
        }
        Ok(phase)
    }
}

/// A validator that reports empty or missing required fields.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    /// Requires every listed field.
    #[must_use]
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RowValidator for RequiredFields {
    async fn validate(&self, fields: &Map<String, Value>) -> Vec<FieldError> {
        self.fields
            .iter()
            .filter(|name| {
                let value = fields
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value);
                match value {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.trim().is_empty(),
                    Some(_) => false,
                }
            })
            .map(|name| FieldError::new(name.clone(), "is required"))
            .collect()
    }
}
