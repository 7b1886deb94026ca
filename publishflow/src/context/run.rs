//! The run context threaded through every pipeline component.

use super::RunIdentity;
use crate::cancellation::CancellationToken;
use crate::config::PublishConfig;
use crate::core::{GroupSuccess, PublishMessage, RecordMap, RunMode, Severity};
use crate::events::{LoggingMessageSink, MessageSink};
use crate::ports::{ImportRowStore, RemoteSystem};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A run-scoped lookup table, e.g. resolved group or organization ids.
pub type LookupCache = DashMap<String, String>;

/// Everything one publish run shares across types, phases and batches.
///
/// A context is created fresh per run and discarded when the run ends; the
/// record maps and lookup caches it holds never outlive it.
pub struct RunContext {
    identity: RunIdentity,
    config: PublishConfig,
    cancel_token: Arc<CancellationToken>,
    sink: Arc<dyn MessageSink>,
    rows: Arc<dyn ImportRowStore>,
    remote: Arc<dyn RemoteSystem>,
    record_maps: DashMap<String, Arc<RecordMap>>,
    lookups: DashMap<String, Arc<LookupCache>>,
    tallies: DashMap<(String, RunMode), Arc<GroupSuccess>>,
    sequence: AtomicU64,
}

impl RunContext {
    /// Creates a new context that logs messages through `tracing`.
    #[must_use]
    pub fn new(
        config: PublishConfig,
        rows: Arc<dyn ImportRowStore>,
        remote: Arc<dyn RemoteSystem>,
    ) -> Self {
        Self {
            identity: RunIdentity::new(),
            config,
            cancel_token: CancellationToken::shared(),
            sink: Arc::new(LoggingMessageSink::new()),
            rows,
            remote,
            record_maps: DashMap::new(),
            lookups: DashMap::new(),
            tallies: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Sets the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the message sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel_token = token;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Returns the run mode.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel_token
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Requests cancellation of the run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel_token.cancel(reason);
    }

    /// Returns the import row store.
    #[must_use]
    pub fn rows(&self) -> &Arc<dyn ImportRowStore> {
        &self.rows
    }

    /// Returns the remote system.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteSystem> {
        &self.remote
    }

    /// Returns the record map of a data source type, creating it on first use.
    #[must_use]
    pub fn record_map(&self, type_name: &str) -> Arc<RecordMap> {
        self.record_maps
            .entry(type_name.to_lowercase())
            .or_default()
            .value()
            .clone()
    }

    /// Returns a named lookup cache, creating it on first use.
    #[must_use]
    pub fn lookup_cache(&self, name: &str) -> Arc<LookupCache> {
        self.lookups
            .entry(name.to_lowercase())
            .or_default()
            .value()
            .clone()
    }

    /// Returns the tally of one type and phase, creating it on first use.
    ///
    /// The orchestrator reads it back when a procedure fails, so the counts
    /// gathered before the failure still reach the run summary.
    #[must_use]
    pub fn phase_tally(&self, type_name: &str, mode: RunMode) -> Arc<GroupSuccess> {
        self.tallies
            .entry((type_name.to_string(), mode))
            .or_default()
            .value()
            .clone()
    }

    /// Stamps and emits a message.
    pub async fn emit(&self, message: PublishMessage) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.emit(message.with_sequence(sequence)).await;
    }

    /// Emits a message built from its parts.
    pub async fn log(
        &self,
        severity: Severity,
        type_name: &str,
        instance_name: &str,
        row_number: u64,
        text: impl Into<String>,
    ) {
        self.emit(PublishMessage::new(
            severity,
            type_name,
            instance_name,
            row_number,
            text,
        ))
        .await;
    }

    /// Emits an information message.
    pub async fn info(&self, type_name: &str, instance_name: &str, text: impl Into<String>) {
        self.log(Severity::Information, type_name, instance_name, 0, text)
            .await;
    }

    /// Emits a warning message.
    pub async fn warning(
        &self,
        type_name: &str,
        instance_name: &str,
        row_number: u64,
        text: impl Into<String>,
    ) {
        self.log(Severity::Warning, type_name, instance_name, row_number, text)
            .await;
    }

    /// Emits an error message.
    pub async fn error(
        &self,
        type_name: &str,
        instance_name: &str,
        row_number: u64,
        text: impl Into<String>,
    ) {
        self.log(Severity::Error, type_name, instance_name, row_number, text)
            .await;
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.identity.run_id)
            .field("mode", &self.config.mode)
            .field("cancelled", &self.is_cancelled())
            .field("record_maps", &self.record_maps.len())
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordMapEntry;
    use crate::events::CollectingMessageSink;
    use crate::testing::{InMemoryRemoteSystem, InMemoryRowStore};

    fn context(sink: Arc<CollectingMessageSink>) -> RunContext {
        RunContext::new(
            PublishConfig::default(),
            Arc::new(InMemoryRowStore::new()),
            Arc::new(InMemoryRemoteSystem::new("1.0")),
        )
        .with_sink(sink)
    }

    #[tokio::test]
    async fn test_messages_are_sequenced() {
        let sink = Arc::new(CollectingMessageSink::new());
        let ctx = context(sink.clone());

        ctx.info("Party", "", "first").await;
        ctx.error("Party", "people", 3, "second").await;

        let messages = sink.messages();
        assert_eq!(messages[0].sequence, 1);
        assert_eq!(messages[1].sequence, 2);
        assert_eq!(messages[1].row_number, 3);
        assert_eq!(messages[1].severity, Severity::Error);
    }

    #[test]
    fn test_record_maps_are_shared_per_type() {
        let ctx = context(Arc::new(CollectingMessageSink::new()));
        ctx.record_map("Party").insert(RecordMapEntry::new("P1", 1));
        assert!(ctx.record_map("party").contains("p1"));
        assert!(ctx.record_map("Membership").is_empty());
    }

    #[test]
    fn test_lookup_caches_are_shared_by_name() {
        let ctx = context(Arc::new(CollectingMessageSink::new()));
        ctx.lookup_cache("groups").insert("board".into(), "G-1".into());
        assert_eq!(
            ctx.lookup_cache("GROUPS").get("board").map(|v| v.value().clone()),
            Some("G-1".to_string())
        );
    }

    #[test]
    fn test_phase_tallies_are_shared_per_type_and_mode() {
        let ctx = context(Arc::new(CollectingMessageSink::new()));
        ctx.phase_tally("Party", RunMode::Validate).add_success(2);
        assert_eq!(ctx.phase_tally("Party", RunMode::Validate).success_count(), 2);
        assert_eq!(ctx.phase_tally("Party", RunMode::Publish).success_count(), 0);
    }

    #[test]
    fn test_cancel_through_context() {
        let token = CancellationToken::shared();
        let ctx = context(Arc::new(CollectingMessageSink::new())).with_cancel_token(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel("stop");
        assert!(ctx.is_cancelled());
    }
}
