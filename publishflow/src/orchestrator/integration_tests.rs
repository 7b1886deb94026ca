//! End-to-end runs of the orchestrator over in-memory ports.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cancellation::CancellationToken;
    use crate::config::PublishConfig;
    use crate::core::{Import, ImportRow};
    use crate::errors::RemoteError;
    use crate::events::CollectingMessageSink;
    use crate::ports::{ImportRowStore, RecordService, RemoteSystem};
    use crate::publishers::{MappedRecordPublisher, Reference};
    use crate::testing::{
        assert_emitted_before, assert_message, assert_no_message, numbered_rows,
        InMemoryRecordService, InMemoryRemoteSystem, InMemoryRowStore, RecordingPublisher,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;

    mock! {
        pub Remote {}

        #[async_trait]
        impl RemoteSystem for Remote {
            async fn ping(&self) -> Result<String, RemoteError>;
            fn service(&self, entity: &str) -> Result<Arc<dyn RecordService>, RemoteError>;
        }
    }

    fn instance(type_name: &str, import_id: &str) -> DataSourceInstance {
        DataSourceInstance::new(import_id, type_name)
            .with_import(Import::new(import_id, vec!["Id".into()]))
    }

    fn context(
        config: PublishConfig,
        rows: impl ImportRowStore + 'static,
        remote: impl RemoteSystem + 'static,
    ) -> (Arc<RunContext>, Arc<CollectingMessageSink>) {
        let sink = Arc::new(CollectingMessageSink::new());
        let ctx = RunContext::new(config, Arc::new(rows), Arc::new(remote)).with_sink(sink.clone());
        (Arc::new(ctx), sink)
    }

    fn publish_config() -> PublishConfig {
        PublishConfig::default()
            .with_mode(RunMode::Publish)
            .with_batch_size(2)
            .with_page_size(4)
    }

    #[tokio::test]
    async fn test_validation_errors_gate_publish() {
        let party = Arc::new(RecordingPublisher::new("Party").failing_rows([2]));
        let rows = InMemoryRowStore::new().with_import("people", numbered_rows(3));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let orchestrator = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(party.clone()));
        let summary = orchestrator.run(&ctx, vec![instance("Party", "people")]).await;

        assert_eq!(summary.status, RunStatus::Aborted);
        assert_eq!(party.rows_processed(RunMode::Validate), vec![1, 2, 3]);
        assert!(party.batches().iter().all(|b| b.mode == RunMode::Validate));
        assert_message(&sink, "Publish aborted: validation reported errors");
        assert_no_message(&sink, "Publish of Party started");
    }

    #[tokio::test]
    async fn test_dependencies_publish_first() {
        let a = Arc::new(
            RecordingPublisher::new("A")
                .with_dependency("B")
                .with_batch_delay(Duration::from_millis(2)),
        );
        let b = Arc::new(RecordingPublisher::new("B").with_batch_delay(Duration::from_millis(2)));
        let rows = InMemoryRowStore::new()
            .with_import("a", numbered_rows(5))
            .with_import("b", numbered_rows(5));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let registry = PublisherRegistry::new()
            .with_publisher(a.clone())
            .with_publisher(b.clone());
        let summary = PublishOrchestrator::new(registry)
            .run(&ctx, vec![instance("A", "a"), instance("B", "b")])
            .await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_message(&sink, "Processing order: B, A");
        assert_emitted_before(&sink, "Validate of B finished", "Validate of A started");
        assert_emitted_before(&sink, "Publish of B finished", "Publish of A started");
        assert!(b.last_finished(RunMode::Publish) <= a.first_started(RunMode::Publish));
        assert_eq!(a.rows_processed(RunMode::Publish), vec![1, 2, 3, 4, 5]);
        assert_eq!(summary.types_in(RunMode::Publish), vec!["B", "A"]);
        assert_eq!(summary.total_errors(), 0);
    }

    #[tokio::test]
    async fn test_hierarchy_and_references_resolve_across_types() {
        let rows = InMemoryRowStore::new()
            .with_import(
                "orgs",
                vec![
                    ImportRow::new(1, vec![json!("team"), json!("dept")]),
                    ImportRow::new(2, vec![json!("dept"), Value::Null]),
                    ImportRow::new(3, vec![json!("lab"), json!("dept")]),
                ],
            )
            .with_import(
                "staff",
                vec![
                    ImportRow::new(1, vec![json!("ann"), json!("team")]),
                    ImportRow::new(2, vec![json!("bob"), json!("dept")]),
                ],
            );
        let orgs = Arc::new(InMemoryRecordService::new("Org"));
        let staff = Arc::new(InMemoryRecordService::new("Person"));
        let remote = InMemoryRemoteSystem::new("1.0")
            .with_service(orgs.clone())
            .with_service(staff.clone());
        let (ctx, sink) = context(publish_config(), rows, remote);

        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(
                MappedRecordPublisher::new("Person", "Id").with_reference(Reference::record("Org", "Org", "org_id")),
            ))
            .with_publisher(Arc::new(
                MappedRecordPublisher::new("Org", "Id").with_parent("Parent", "parent_id"),
            ));
        let instances = vec![
            DataSourceInstance::new("staff", "Person")
                .with_import(Import::new("staff", vec!["Id".into(), "Org".into()])),
            DataSourceInstance::new("orgs", "Org")
                .with_import(Import::new("orgs", vec!["Id".into(), "Parent".into()])),
        ];
        let summary = PublishOrchestrator::new(registry).run(&ctx, instances).await;

        assert_eq!(summary.status, RunStatus::Completed, "{:?}", sink.errors());
        assert_eq!(summary.total_errors(), 0);

        let last_org_write = orgs.calls().iter().map(|c| c.at).max().unwrap();
        let first_person_write = staff.calls().iter().map(|c| c.at).min().unwrap();
        assert!(last_org_write <= first_person_write);

        let org_map = ctx.record_map("Org");
        let dept = org_map.target_id("dept").unwrap();
        let team = org_map.target_id("team").unwrap();
        assert_eq!(orgs.record(&team).unwrap().body["parent_id"], json!(dept));
        assert_eq!(staff.records_for_source("ann")[0].body["org_id"], json!(team));
        assert_eq!(staff.records_for_source("bob")[0].body["org_id"], json!(dept));
        assert!(orgs.first_write_of("dept").unwrap().sequence < orgs.first_write_of("lab").unwrap().sequence);
    }

    #[tokio::test]
    async fn test_unreachable_remote_fails_before_initialization() {
        let mut remote = MockRemote::new();
        remote
            .expect_ping()
            .times(1)
            .returning(|| Err(RemoteError::Unreachable("no route to host".to_string())));
        remote.expect_service().never();

        let party = Arc::new(RecordingPublisher::new("Party"));
        let rows = InMemoryRowStore::new().with_import("people", numbered_rows(2));
        let (ctx, sink) = context(publish_config(), rows, remote);

        let summary = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(party.clone()))
            .run(&ctx, vec![instance("Party", "people")])
            .await;

        assert!(matches!(summary.status, RunStatus::Failed(ref reason) if reason.contains("no route to host")));
        assert_eq!(party.init_calls(), 0);
        assert!(party.batches().is_empty());
        let last = assert_message(&sink, "Publish run failed");
        assert_eq!(last.severity, Severity::Error);
        assert!(last.text.contains("0 succeeded, 0 failed"), "{}", last.text);
    }

    #[tokio::test]
    async fn test_old_remote_version_is_rejected() {
        let config = publish_config().with_min_remote_version("2.0");
        let rows = InMemoryRowStore::new().with_import("people", numbered_rows(2));
        let (ctx, sink) = context(config, rows, InMemoryRemoteSystem::new("1.5"));

        let summary = PublishOrchestrator::new(
            PublisherRegistry::new().with_publisher(Arc::new(RecordingPublisher::new("Party"))),
        )
        .run(&ctx, vec![instance("Party", "people")])
        .await;

        assert!(matches!(summary.status, RunStatus::Failed(_)));
        let message = assert_message(&sink, "not supported");
        assert_eq!(message.severity, Severity::Error);
        assert_no_message(&sink, "Processing order");
    }

    #[tokio::test]
    async fn test_unexpected_error_halts_the_run() {
        let a = Arc::new(RecordingPublisher::new("A").failing_with("boom"));
        let b = Arc::new(RecordingPublisher::new("B").with_dependency("A"));
        let rows = InMemoryRowStore::new()
            .with_import("a", numbered_rows(2))
            .with_import("b", numbered_rows(2));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let registry = PublisherRegistry::new()
            .with_publisher(a.clone())
            .with_publisher(b.clone());
        let summary = PublishOrchestrator::new(registry)
            .run(&ctx, vec![instance("A", "a"), instance("B", "b")])
            .await;

        assert!(matches!(summary.status, RunStatus::Failed(_)));
        let failure = assert_message(&sink, "Validate of A failed");
        assert!(failure.text.contains("boom"), "{}", failure.text);
        assert!(b.batches().is_empty());
        assert_no_message(&sink, "Validate of B started");
    }

    #[tokio::test]
    async fn test_failed_type_still_reports_its_counts() {
        let a = Arc::new(RecordingPublisher::new("A").failing_rows([3]).failing_with("boom"));
        let rows = InMemoryRowStore::new().with_import("a", numbered_rows(4));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let summary = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(a))
            .run(&ctx, vec![instance("A", "a")])
            .await;

        assert!(matches!(summary.status, RunStatus::Failed(_)));
        assert_emitted_before(&sink, "Validate of A finished: 3 succeeded, 1 failed", "Validate of A failed");
        let phase = summary.phase("A", RunMode::Validate).unwrap();
        assert!(!phase.success);
        assert_eq!((phase.successes, phase.errors), (3, 1));
        assert_eq!(summary.total_successes(), 3);
        assert_eq!(summary.total_errors(), 1);
        assert_message(&sink, "Publish run failed");
        let last = sink.messages().into_iter().max_by_key(|m| m.sequence).unwrap();
        assert!(last.text.contains("3 succeeded, 1 failed"), "{}", last.text);
    }

    #[tokio::test]
    async fn test_panicking_type_fails_the_run_with_its_counts() {
        let a = Arc::new(RecordingPublisher::new("A").panicking());
        let b = Arc::new(RecordingPublisher::new("B").with_dependency("A"));
        let rows = InMemoryRowStore::new()
            .with_import("a", numbered_rows(2))
            .with_import("b", numbered_rows(2));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let registry = PublisherRegistry::new()
            .with_publisher(a)
            .with_publisher(b.clone());
        let summary = PublishOrchestrator::new(registry)
            .run(&ctx, vec![instance("A", "a"), instance("B", "b")])
            .await;

        assert!(matches!(summary.status, RunStatus::Failed(ref reason) if reason.contains("did not complete")));
        assert_message(&sink, "Validate of A finished: 2 succeeded, 0 failed");
        assert_eq!(summary.total_successes(), 2);
        assert!(b.batches().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_later_types() {
        let token = CancellationToken::shared();
        let a = Arc::new(RecordingPublisher::new("A"));
        let b = Arc::new(RecordingPublisher::new("B").with_dependency("A"));
        let rows = InMemoryRowStore::new()
            .with_import("a", numbered_rows(20))
            .with_import("b", numbered_rows(4))
            .cancel_after_pages(2, token.clone());
        let sink = Arc::new(CollectingMessageSink::new());
        let ctx = Arc::new(
            RunContext::new(publish_config(), Arc::new(rows), Arc::new(InMemoryRemoteSystem::new("1.0")))
                .with_sink(sink.clone())
                .with_cancel_token(token),
        );

        let registry = PublisherRegistry::new()
            .with_publisher(a.clone())
            .with_publisher(b.clone());
        let summary = PublishOrchestrator::new(registry)
            .run(&ctx, vec![instance("A", "a"), instance("B", "b")])
            .await;

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_message(&sink, "Cancelled: row store cancel trigger");
        assert!(a.rows_processed(RunMode::Validate).len() < 20);
        assert!(b.batches().is_empty());
        assert!(a.batches().iter().all(|batch| batch.mode == RunMode::Validate));
    }

    #[tokio::test]
    async fn test_validate_only_run_never_publishes() {
        let party = Arc::new(RecordingPublisher::new("Party"));
        let rows = InMemoryRowStore::new().with_import("people", numbered_rows(3));
        let config = publish_config().with_mode(RunMode::Validate);
        let (ctx, sink) = context(config, rows, InMemoryRemoteSystem::new("1.0"));

        let summary = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(party.clone()))
            .run(&ctx, vec![instance("Party", "people")])
            .await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(party.rows_processed(RunMode::Validate), vec![1, 2, 3]);
        assert!(party.rows_processed(RunMode::Publish).is_empty());
        assert_message(&sink, "Validation finished; publishing was not requested");
        assert_message(&sink, "Validate run completed: 3 succeeded, 0 failed");
    }

    #[tokio::test]
    async fn test_non_validatable_type_still_publishes() {
        let lookup = Arc::new(RecordingPublisher::new("Lookup").not_validatable());
        let rows = InMemoryRowStore::new().with_import("codes", numbered_rows(3));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let summary = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(lookup.clone()))
            .run(&ctx, vec![instance("Lookup", "codes")])
            .await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_message(&sink, "Lookup is not validated");
        assert!(lookup.rows_processed(RunMode::Validate).is_empty());
        assert_eq!(lookup.rows_processed(RunMode::Publish), vec![1, 2, 3]);
        assert!(summary.phase("Lookup", RunMode::Validate).is_none());
        assert_eq!(summary.phase("Lookup", RunMode::Publish).unwrap().successes, 3);
    }

    #[tokio::test]
    async fn test_final_summary_reports_totals() {
        let party = Arc::new(RecordingPublisher::new("Party"));
        let rows = InMemoryRowStore::new().with_import("people", numbered_rows(3));
        let (ctx, sink) = context(publish_config(), rows, InMemoryRemoteSystem::new("1.0"));

        let summary = PublishOrchestrator::new(PublisherRegistry::new().with_publisher(party))
            .run(&ctx, vec![instance("Party", "people")])
            .await;

        assert_eq!(summary.total_successes(), 6);
        assert_emitted_before(&sink, "Publish run started", "Connected to remote system version 1.0");
        let last = sink.messages().into_iter().max_by_key(|m| m.sequence).unwrap();
        assert!(last.text.starts_with("Publish run completed: 6 succeeded, 0 failed"), "{}", last.text);
    }
}
