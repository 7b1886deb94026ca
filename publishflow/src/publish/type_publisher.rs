//! Paged, batched processing of every import of one data source type.

use super::{BatchPool, DataSourcePublisher};
use crate::context::RunContext;
use crate::core::{DataSourceInstance, GroupSuccess, Import, PhaseOutcome, RowBatch, RunMode};
use crate::errors::PublishError;
use crate::manifest::DataSourceType;
use crate::ports::RemoteRecord;
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives the shared batch pipeline for one type and one mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypePublisher;

impl TypePublisher {
    /// Runs `mode` over every import of every instance of `entry`.
    ///
    /// Counts go to the context's tally for the type and mode. In publish
    /// mode harvested records are reconciled first. Each import
    /// is then paged from the row store, split into batches and dispatched
    /// through its own [`BatchPool`], which is drained before the next
    /// import starts.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (a closed pool) are returned. Row
    /// failures are logged and counted on the outcome.
    pub async fn run(
        ctx: &Arc<RunContext>,
        mode: RunMode,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        let outcome = ctx.phase_tally(entry.name(), mode);
        let publisher = entry.publisher();

        if mode == RunMode::Publish && publisher.harvests() {
            for instance in entry.instances() {
                if ctx.is_cancelled() {
                    break;
                }
                reconcile_harvested(ctx, publisher.as_ref(), instance, &outcome).await;
            }
        }

        for instance in entry.instances() {
            for import in &instance.imports {
                if ctx.is_cancelled() {
                    return Ok(PhaseOutcome::from_group(outcome));
                }
                let target = BatchTarget {
                    ctx: Arc::clone(ctx),
                    mode,
                    publisher: Arc::clone(publisher),
                    instance: Arc::clone(instance),
                    import: Arc::new(import.clone()),
                    outcome: Arc::clone(&outcome),
                };
                run_import(&target).await?;
            }
        }

        Ok(PhaseOutcome::from_group(outcome))
    }
}

/// Everything a batch job needs, shared by all batches of one import.
#[derive(Clone)]
pub(crate) struct BatchTarget {
    pub(crate) ctx: Arc<RunContext>,
    pub(crate) mode: RunMode,
    pub(crate) publisher: Arc<dyn DataSourcePublisher>,
    pub(crate) instance: Arc<DataSourceInstance>,
    pub(crate) import: Arc<Import>,
    pub(crate) outcome: Arc<GroupSuccess>,
}

impl BatchTarget {
    /// Queues one batch on `pool`.
    pub(crate) async fn submit(&self, pool: &BatchPool, batch: RowBatch) -> Result<(), PublishError> {
        let target = self.clone();
        pool.submit(async move {
            target
                .publisher
                .process_batch(
                    &target.ctx,
                    target.mode,
                    &target.instance,
                    &target.import,
                    batch,
                    &target.outcome,
                )
                .await;
        })
        .await
    }
}

/// Drains `pool` and counts every batch that did not complete as an error.
pub(crate) async fn finish_pool(
    pool: BatchPool,
    ctx: &RunContext,
    type_name: &str,
    outcome: &GroupSuccess,
) -> Result<(), PublishError> {
    let name = pool.name().to_string();
    let stats = pool.drain().await?;
    if stats.panicked > 0 {
        ctx.error(
            type_name,
            "",
            0,
            format!("{} batch(es) of '{name}' did not complete", stats.panicked),
        )
        .await;
        outcome.add_error(stats.panicked as u64);
    }
    Ok(())
}

async fn run_import(target: &BatchTarget) -> Result<(), PublishError> {
    let ctx = &target.ctx;
    let type_name = target.publisher.type_name();
    let config = ctx.config();
    let batch_size = config.batch_size.max(1);
    let page_size = config.page_size.max(1);

    let pool = BatchPool::for_config(format!("{type_name}/{}", target.import.id), config);
    let mut batch: RowBatch = Vec::with_capacity(batch_size);
    let mut offset = 0;
    let mut stopped = false;

    'pages: loop {
        if ctx.is_cancelled() {
            stopped = true;
            break;
        }

        let page = match ctx.rows().fetch_page(&target.import.id, offset, page_size).await {
            Ok(page) => page,
            Err(e) => {
                ctx.error(type_name, &target.instance.name, 0, e.to_string()).await;
                target.outcome.error();
                stopped = true;
                break;
            }
        };
        let fetched = page.len();
        offset += fetched;

        for row in page {
            batch.push(row);
            if batch.len() >= batch_size {
                if ctx.is_cancelled() {
                    stopped = true;
                    break 'pages;
                }
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                target.submit(&pool, full).await?;
            }
        }

        if fetched < page_size {
            break;
        }
    }

    if !stopped && !batch.is_empty() && !ctx.is_cancelled() {
        target.submit(&pool, batch).await?;
    }

    debug!(
        type_name,
        import = %target.import.id,
        rows = offset,
        batches = pool.submitted(),
        "Import dispatched"
    );
    finish_pool(pool, ctx, type_name, &target.outcome).await
}

/// Writes every selected harvested record of `instance` back to the remote
/// system: updated when it still exists, added when it does not.
pub(crate) async fn reconcile_harvested(
    ctx: &RunContext,
    publisher: &dyn DataSourcePublisher,
    instance: &DataSourceInstance,
    outcome: &GroupSuccess,
) {
    let type_name = publisher.type_name();
    let selected: Vec<_> = instance.selected_harvested().collect();
    if selected.is_empty() {
        return;
    }

    let service = match ctx.remote().service(publisher.entity()) {
        Ok(service) => service,
        Err(e) => {
            ctx.error(type_name, &instance.name, 0, e.to_string()).await;
            outcome.add_error(selected.len() as u64);
            return;
        }
    };

    for harvested in selected {
        if ctx.is_cancelled() {
            return;
        }
        let record = RemoteRecord::with_id(harvested.id.clone(), harvested.body.clone());
        let result = match service.find_by_id(&harvested.id).await {
            Ok(Some(_)) => service.update(record).await,
            Ok(None) => service.add(record).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => outcome.success(),
            Err(e) => {
                warn!(type_name, instance = %instance.name, id = %harvested.id, "Harvest reconciliation failed");
                ctx.error(
                    type_name,
                    &instance.name,
                    0,
                    format!("Harvested record '{}' could not be reconciled: {e}", harvested.id),
                )
                .await;
                outcome.error();
            }
        }
    }
}
