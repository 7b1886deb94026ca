//! The per-type publisher trait.

use super::{HierarchyResolver, TypePublisher};
use crate::context::RunContext;
use crate::core::{DataSourceInstance, GroupSuccess, Import, ImportRow, PhaseOutcome, RowBatch, RunMode};
use crate::errors::PublishError;
use crate::manifest::DataSourceType;
use crate::validation::RowValidator;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Concrete behavior of one data source type.
///
/// Implementations supply the batch handler and describe the type
/// (dependencies, whether it validates, harvests or references itself).
/// The default `validate` and `publish` procedures run the shared paged
/// batch pipeline and, for hierarchical types, the depth resolver.
#[async_trait]
pub trait DataSourcePublisher: Send + Sync + Debug {
    /// Returns the data source type name.
    fn type_name(&self) -> &str;

    /// Returns the remote entity written by this type.
    fn entity(&self) -> &str {
        self.type_name()
    }

    /// Returns the names of the types that must be published first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Returns whether the type takes part in the validate phase.
    fn is_validatable(&self) -> bool {
        true
    }

    /// Returns whether the type reconciles harvested reference records.
    fn harvests(&self) -> bool {
        false
    }

    /// Returns whether rows reference parent rows of the same type.
    fn is_hierarchical(&self) -> bool {
        false
    }

    /// Returns the source id of a row, used to place it in the hierarchy.
    fn record_key(&self, _import: &Import, _row: &ImportRow) -> Option<String> {
        None
    }

    /// Returns the validator for this type's rows.
    fn validator(&self) -> Option<Arc<dyn RowValidator>> {
        None
    }

    /// One-time initialization, called when the type is first seen while
    /// building the manifest. Typically pre-warms lookup caches on `ctx`.
    async fn initialize(&self, _ctx: &RunContext) -> Result<(), PublishError> {
        Ok(())
    }

    /// Processes one batch. Rows are handled sequentially in source order;
    /// row failures are logged through `ctx` and counted on `outcome`.
    async fn process_batch(
        &self,
        ctx: &Arc<RunContext>,
        mode: RunMode,
        instance: &DataSourceInstance,
        import: &Import,
        batch: RowBatch,
        outcome: &GroupSuccess,
    );

    /// Validates every import of the type.
    async fn validate(
        &self,
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        let phase = TypePublisher::run(ctx, RunMode::Validate, entry).await?;
        if !self.is_hierarchical() || ctx.is_cancelled() {
            return Ok(phase);
        }

        HierarchyResolver::link_external_parents(ctx, entry).await;
        HierarchyResolver::assign_depths(ctx, entry, &phase.group).await;
        Ok(PhaseOutcome::from_group(phase.group))
    }

    /// Publishes every import of the type.
    async fn publish(
        &self,
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        if self.is_hierarchical() {
            HierarchyResolver::publish_by_depth(ctx, entry).await
        } else {
            TypePublisher::run(ctx, RunMode::Publish, entry).await
        }
    }
}
