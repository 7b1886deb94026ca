//! Two-phase run orchestration.
//!
//! A run pings the remote system, builds the manifest, validates every
//! validatable type in dependency order and, for publish runs without
//! validation errors, publishes every type in the same order. Each type's
//! procedure runs in its own task so a panicking publisher fails the run
//! instead of the host.

mod summary;

#[cfg(test)]
mod integration_tests;

pub use summary::{PhaseSummary, RunStatus, RunSummary};

use crate::context::RunContext;
use crate::core::{format_elapsed, DataSourceInstance, PhaseOutcome, RunMode, Severity};
use crate::errors::PublishError;
use crate::manifest::{DataSourceType, Manifest, PublisherRegistry};
use crate::observability::{PhaseSpan, RunEventEmitter};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Drives validate and publish phases over a manifest.
#[derive(Debug, Default)]
pub struct PublishOrchestrator {
    registry: PublisherRegistry,
    events: RunEventEmitter,
}

impl PublishOrchestrator {
    /// Creates an orchestrator over the registered publishers.
    #[must_use]
    pub fn new(registry: PublisherRegistry) -> Self {
        Self {
            registry,
            events: RunEventEmitter::new(),
        }
    }

    /// Returns the publisher registry.
    #[must_use]
    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    /// Checks connectivity and builds the manifest.
    ///
    /// # Errors
    ///
    /// Fails when the remote system is unreachable or too old, or when the
    /// manifest cannot be built.
    pub async fn initialize(
        &self,
        ctx: &RunContext,
        instances: Vec<DataSourceInstance>,
    ) -> Result<Manifest, PublishError> {
        let version = ctx.remote().ping().await?;
        if let Some(required) = &ctx.config().min_remote_version {
            if compare_versions(&version, required) == Ordering::Less {
                return Err(PublishError::IncompatibleVersion {
                    found: version,
                    required: required.clone(),
                });
            }
        }
        ctx.info("", "", format!("Connected to remote system version {version}"))
            .await;

        let manifest = Manifest::build(ctx, &self.registry, instances).await?;
        ctx.info(
            "",
            "",
            format!("Processing order: {}", manifest.type_names().join(", ")),
        )
        .await;
        Ok(manifest)
    }

    /// Validates one type, with start and end messages.
    ///
    /// # Errors
    ///
    /// Returns the error of the type's procedure, or an internal error if it
    /// panicked.
    pub async fn validate_type(
        &self,
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        run_phase(ctx, entry, RunMode::Validate).await
    }

    /// Publishes one type, with start and end messages.
    ///
    /// # Errors
    ///
    /// Returns the error of the type's procedure, or an internal error if it
    /// panicked.
    pub async fn publish_type(
        &self,
        ctx: &Arc<RunContext>,
        entry: &DataSourceType,
    ) -> Result<PhaseOutcome, PublishError> {
        run_phase(ctx, entry, RunMode::Publish).await
    }

    /// Runs every phase requested by the context's mode.
    ///
    /// Never fails: run-fatal errors are logged and reported through
    /// [`RunSummary::status`]. A final summary message is always emitted.
    pub async fn run(&self, ctx: &Arc<RunContext>, instances: Vec<DataSourceInstance>) -> RunSummary {
        let started = Instant::now();
        let mode = ctx.mode();
        let run_id = ctx.identity().run_id;
        info!(%run_id, %mode, instances = instances.len(), "Run started");
        ctx.info("", "", format!("{mode} run started")).await;

        let mut phases = Vec::new();
        let status = self.execute(ctx, instances, &mut phases).await;

        let summary = RunSummary {
            run_id,
            mode,
            status,
            phases,
            elapsed: format_elapsed(started.elapsed()),
        };
        self.finish(ctx, &summary).await;
        summary
    }

    async fn execute(
        &self,
        ctx: &Arc<RunContext>,
        instances: Vec<DataSourceInstance>,
        phases: &mut Vec<PhaseSummary>,
    ) -> RunStatus {
        let manifest = match self.initialize(ctx, instances).await {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(error = %e, "Run initialization failed");
                ctx.error("", "", 0, e.detail()).await;
                return RunStatus::Failed(e.to_string());
            }
        };

        let mut has_error = false;
        for entry in manifest.entries() {
            if !entry.publisher().is_validatable() {
                ctx.info(entry.name(), "", format!("{} is not validated", entry.name()))
                    .await;
                continue;
            }
            match self.validate_type(ctx, entry).await {
                Ok(outcome) => {
                    has_error |= !outcome.success || outcome.group.has_errors();
                    phases.push(PhaseSummary::new(entry.name(), RunMode::Validate, &outcome));
                }
                Err(e) => return fail_type(ctx, entry, RunMode::Validate, &e, phases).await,
            }
            if ctx.is_cancelled() {
                return cancelled(ctx).await;
            }
        }

        if ctx.mode() == RunMode::Validate {
            ctx.info("", "", "Validation finished; publishing was not requested")
                .await;
            return RunStatus::Completed;
        }
        if has_error {
            ctx.error("", "", 0, "Publish aborted: validation reported errors")
                .await;
            return RunStatus::Aborted;
        }

        for entry in manifest.entries() {
            match self.publish_type(ctx, entry).await {
                Ok(outcome) => {
                    phases.push(PhaseSummary::new(entry.name(), RunMode::Publish, &outcome));
                }
                Err(e) => return fail_type(ctx, entry, RunMode::Publish, &e, phases).await,
            }
            if ctx.is_cancelled() {
                return cancelled(ctx).await;
            }
        }

        RunStatus::Completed
    }

    async fn finish(&self, ctx: &RunContext, summary: &RunSummary) {
        let severity = match summary.status {
            RunStatus::Completed => Severity::Information,
            RunStatus::Aborted | RunStatus::Cancelled => Severity::Warning,
            RunStatus::Failed(_) => Severity::Error,
        };
        ctx.log(
            severity,
            "",
            "",
            0,
            format!(
                "{} run {}: {} succeeded, {} failed, elapsed {}",
                summary.mode,
                summary.status,
                summary.total_successes(),
                summary.total_errors(),
                summary.elapsed
            ),
        )
        .await;
        self.events.emit_run_event(summary);
    }
}

async fn run_phase(
    ctx: &Arc<RunContext>,
    entry: &DataSourceType,
    phase: RunMode,
) -> Result<PhaseOutcome, PublishError> {
    let type_name = entry.name().to_string();
    let tally = ctx.phase_tally(&type_name, phase);
    ctx.info(&type_name, "", format!("{phase} of {type_name} started"))
        .await;

    let span = PhaseSpan::new(ctx.identity().run_id, phase, type_name.as_str())
        .with_instances(entry.instances().len())
        .span();
    let task_ctx = Arc::clone(ctx);
    let task_entry = entry.clone();
    let handle = tokio::spawn(
        async move {
            let publisher = Arc::clone(task_entry.publisher());
            match phase {
                RunMode::Validate => publisher.validate(&task_ctx, &task_entry).await,
                RunMode::Publish => publisher.publish(&task_ctx, &task_entry).await,
            }
        }
        .instrument(span),
    );

    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(PublishError::Internal(format!(
            "{phase} of {type_name} did not complete: {e}"
        ))),
    };

    // A failed procedure still reports what it counted before failing.
    let group = match &result {
        Ok(outcome) => Arc::clone(&outcome.group),
        Err(_) => tally,
    };
    let text = format!(
        "{phase} of {type_name} finished: {} succeeded, {} failed, elapsed {}",
        group.success_count(),
        group.error_count(),
        group.elapsed_display()
    );
    let severity = if group.has_errors() || result.is_err() {
        Severity::Warning
    } else {
        Severity::Information
    };
    ctx.log(severity, &type_name, "", 0, text).await;
    debug!(type_name = %type_name, %phase, ok = result.is_ok(), "Phase finished");
    result
}

async fn fail_type(
    ctx: &RunContext,
    entry: &DataSourceType,
    phase: RunMode,
    err: &PublishError,
    phases: &mut Vec<PhaseSummary>,
) -> RunStatus {
    let partial = PhaseOutcome::failed(ctx.phase_tally(entry.name(), phase));
    phases.push(PhaseSummary::new(entry.name(), phase, &partial));
    error!(type_name = entry.name(), %phase, error = %err, "Type procedure failed");
    ctx.error(
        entry.name(),
        "",
        0,
        format!("{phase} of {} failed: {}", entry.name(), err.detail()),
    )
    .await;
    RunStatus::Failed(err.to_string())
}

async fn cancelled(ctx: &RunContext) -> RunStatus {
    let reason = ctx
        .cancel_token()
        .reason()
        .unwrap_or_else(|| "no reason given".to_string());
    ctx.warning("", "", 0, format!("Cancelled: {reason}")).await;
    RunStatus::Cancelled
}

/// Compares dotted version strings numerically; non-numeric parts count as 0.
fn compare_versions(found: &str, required: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (found, required) = (parse(found), parse(required));
    let len = found.len().max(required.len());
    for i in 0..len {
        let a = found.get(i).copied().unwrap_or(0);
        let b = required.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}
