//! Depth assignment and depth-ordered publishing for self-referencing types.
//!
//! A hierarchical type's rows point at parent rows of the same type. Depth 0
//! records have no parent (or a parent that already exists remotely); a
//! record at depth `d` is published only after every record at depth `d - 1`
//! has been written, so its parent's remote id is known.

use super::type_publisher::{finish_pool, reconcile_harvested, BatchTarget};
use super::BatchPool;
use crate::context::RunContext;
use crate::core::{GroupSuccess, ImportRow, PhaseOutcome, RecordMap, RecordMapEntry, RunMode};
use crate::errors::{PublishError, RowStoreError};
use crate::manifest::DataSourceType;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of walking a record's parent chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthResolution {
    /// The chain ends at a root after this many hops.
    Resolved(u32),
    /// The chain revisits a record or is longer than the allowed bound.
    Cycle,
    /// A record on the chain references a parent that is not in the map.
    Unresolved(String),
}

/// Computes the depth of `source_id` by walking parent links.
///
/// The walk is iterative and stops after `max_hops` hops, so a cycle, or a
/// chain deeper than `max_hops`, reports [`DepthResolution::Cycle`]. A depth
/// already stored on an ancestor is reused instead of walking further.
#[must_use]
pub fn resolve_depth(map: &RecordMap, source_id: &str, max_hops: u32) -> DepthResolution {
    let Some(mut current) = map.get(source_id) else {
        return DepthResolution::Unresolved(source_id.to_string());
    };
    let mut hops: u32 = 0;

    loop {
        if current.has_depth() {
            let known = u32::try_from(current.depth).unwrap_or(0);
            let total = hops.saturating_add(known);
            return if total > max_hops {
                DepthResolution::Cycle
            } else {
                DepthResolution::Resolved(total)
            };
        }

        let Some(parent_id) = current.related_id.take() else {
            return DepthResolution::Resolved(hops);
        };

        hops += 1;
        if hops > max_hops {
            return DepthResolution::Cycle;
        }

        match map.get(&parent_id) {
            Some(parent) => current = parent,
            None => return DepthResolution::Unresolved(parent_id),
        }
    }
}

/// Summary of a depth assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyReport {
    /// Number of records per resolved depth.
    pub levels: BTreeMap<u32, usize>,
    /// Source ids whose walk hit the bound.
    pub cycles: Vec<String>,
    /// (source id, missing parent id) pairs.
    pub unresolved: Vec<(String, String)>,
}

impl HierarchyReport {
    /// Returns true if every record received a depth.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.unresolved.is_empty()
    }

    /// Returns the deepest resolved level.
    #[must_use]
    pub fn max_depth(&self) -> Option<u32> {
        self.levels.keys().next_back().copied()
    }
}

/// Depth resolution and ordered publishing over a type's [`RecordMap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyResolver;

impl HierarchyResolver {
    /// Looks up every parent id missing from the map in the remote system.
    ///
    /// Parents that already exist remotely are inserted as external records
    /// with depth 0, so their children can be published under them. Runs
    /// after the validate pool has drained, when every imported row is in
    /// the map. Returns the number of parents linked.
    pub async fn link_external_parents(ctx: &RunContext, entry: &DataSourceType) -> usize {
        let type_name = entry.name();
        let map = ctx.record_map(type_name);
        let mut missing: Vec<String> = map
            .snapshot()
            .into_iter()
            .filter_map(|record| record.related_id)
            .filter(|parent| !map.contains(parent))
            .collect();
        missing.sort_by_key(|parent| parent.to_lowercase());
        missing.dedup_by_key(|parent| parent.to_lowercase());
        if missing.is_empty() {
            return 0;
        }

        let service = match ctx.remote().service(entry.publisher().entity()) {
            Ok(service) => service,
            Err(e) => {
                ctx.warning(type_name, "", 0, format!("Parent records cannot be looked up: {e}"))
                    .await;
                return 0;
            }
        };

        let mut linked = 0;
        for parent in missing {
            if ctx.is_cancelled() {
                break;
            }
            match service.find_by_id(&parent).await {
                Ok(Some(record)) => {
                    let target = record.id.unwrap_or_else(|| parent.clone());
                    if map.insert(RecordMapEntry::external(parent, target)) {
                        linked += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    ctx.warning(type_name, "", 0, format!("Lookup of parent '{parent}' failed: {e}"))
                        .await;
                }
            }
        }
        debug!(type_name, linked, "External parents linked");
        linked
    }

    /// Assigns a depth to every record of `entry` collected during validation.
    ///
    /// Resolved depths are stored in the map. This is where a hierarchical
    /// row is counted: as a success once its depth resolves, as an error for
    /// a circular or too deep chain or a dangling parent reference. Rows
    /// already rejected during validation still get a depth but are not
    /// counted again.
    pub async fn assign_depths(
        ctx: &RunContext,
        entry: &DataSourceType,
        outcome: &GroupSuccess,
    ) -> HierarchyReport {
        let type_name = entry.name();
        let map = ctx.record_map(type_name);
        let max_hops = ctx.config().max_hierarchy_depth;
        let mut report = HierarchyReport::default();

        for record in map.snapshot() {
            if record.external {
                continue;
            }
            match resolve_depth(&map, &record.source_id, max_hops) {
                DepthResolution::Resolved(depth) => {
                    map.set_depth(&record.source_id, i32::try_from(depth).unwrap_or(i32::MAX));
                    *report.levels.entry(depth).or_default() += 1;
                    if !record.rejected {
                        outcome.success();
                    }
                }
                DepthResolution::Cycle => {
                    ctx.error(
                        type_name,
                        &record.instance_name,
                        record.row_number,
                        format!(
                            "Circular hierarchy detected for '{}' (more than {max_hops} levels)",
                            record.source_id
                        ),
                    )
                    .await;
                    if !record.rejected {
                        outcome.error();
                    }
                    report.cycles.push(record.source_id);
                }
                DepthResolution::Unresolved(parent) => {
                    ctx.error(
                        type_name,
                        &record.instance_name,
                        record.row_number,
                        format!(
                            "Parent '{parent}' of '{}' could not be resolved",
                            record.source_id
                        ),
                    )
                    .await;
                    if !record.rejected {
                        outcome.error();
                    }
                    report.unresolved.push((record.source_id, parent));
                }
            }
        }

        debug!(
            type_name,
            clean = report.is_clean(),
            max_depth = ?report.max_depth(),
            cycles = report.cycles.len(),
            unresolved = report.unresolved.len(),
            "Hierarchy depths assigned"
        );
        report
    }

    /// Publishes `entry` one depth level at a time.
    ///
    /// Every row is read up front and bucketed by the depth of its record.
    /// Each level is dispatched through a fresh [`BatchPool`] and drained
    /// before the next level starts. Rows without a resolved depth are
    /// skipped and counted as errors.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (a closed pool) are returned.
    pub async fn publish_by_depth(
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        let type_name = entry.name();
        let outcome = ctx.phase_tally(type_name, RunMode::Publish);
        let publisher = entry.publisher();
        let map = ctx.record_map(type_name);

        if publisher.harvests() {
            for instance in entry.instances() {
                if ctx.is_cancelled() {
                    return Ok(PhaseOutcome::from_group(outcome));
                }
                reconcile_harvested(ctx, publisher.as_ref(), instance, &outcome).await;
            }
        }

        // depth -> (instance index, import index) -> rows in source order
        let mut levels: BTreeMap<u32, BTreeMap<(usize, usize), Vec<ImportRow>>> = BTreeMap::new();
        for (inst_idx, instance) in entry.instances().iter().enumerate() {
            for (imp_idx, import) in instance.imports.iter().enumerate() {
                if ctx.is_cancelled() {
                    return Ok(PhaseOutcome::from_group(outcome));
                }
                let rows = match read_all_rows(ctx, &import.id).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        ctx.error(type_name, &instance.name, 0, e.to_string()).await;
                        outcome.error();
                        continue;
                    }
                };
                for row in rows {
                    let depth = publisher
                        .record_key(import, &row)
                        .and_then(|key| map.depth(&key))
                        .and_then(|depth| u32::try_from(depth).ok());
                    match depth {
                        Some(depth) => levels
                            .entry(depth)
                            .or_default()
                            .entry((inst_idx, imp_idx))
                            .or_default()
                            .push(row),
                        None => {
                            ctx.error(
                                type_name,
                                &instance.name,
                                row.row_number,
                                "Row has no resolved hierarchy depth and was not published",
                            )
                            .await;
                            outcome.error();
                        }
                    }
                }
            }
        }

        let batch_size = ctx.config().batch_size.max(1);
        let mut cancelled = false;
        for (depth, groups) in levels {
            if ctx.is_cancelled() {
                break;
            }
            let rows: usize = groups.values().map(Vec::len).sum();
            info!(type_name, depth, rows, "Publishing hierarchy level");

            let pool = BatchPool::for_config(format!("{type_name}/depth-{depth}"), ctx.config());
            'groups: for ((inst_idx, imp_idx), rows) in groups {
                let instance = &entry.instances()[inst_idx];
                let target = BatchTarget {
                    ctx: Arc::clone(ctx),
                    mode: RunMode::Publish,
                    publisher: Arc::clone(publisher),
                    instance: Arc::clone(instance),
                    import: Arc::new(instance.imports[imp_idx].clone()),
                    outcome: Arc::clone(&outcome),
                };
                for chunk in rows.chunks(batch_size) {
                    if ctx.is_cancelled() {
                        cancelled = true;
                        break 'groups;
                    }
                    target.submit(&pool, chunk.to_vec()).await?;
                }
            }
            finish_pool(pool, ctx, type_name, &outcome).await?;
            if cancelled {
                break;
            }
        }

        Ok(PhaseOutcome::from_group(outcome))
    }
}

async fn read_all_rows(ctx: &RunContext, import_id: &str) -> Result<Vec<ImportRow>, RowStoreError> {
    let page_size = ctx.config().page_size.max(1);
    let mut rows = Vec::new();
    loop {
        if ctx.is_cancelled() {
            break;
        }
        let page = ctx.rows().fetch_page(import_id, rows.len(), page_size).await?;
        let fetched = page.len();
        rows.extend(page);
        if fetched < page_size {
            break;
        }
    }
    Ok(rows)
}
