//! End-to-end scenarios against the control surface.

#[cfg(test)]
mod tests {
    use crate::config::ForgeflowConfig;
    use crate::core::{
        is_readme_path, EventPayload, JobId, JobPhase, RunRecord, RunStatus, REASON_INTERRUPTED,
        REASON_STOPPED_BY_USER,
    };
    use crate::errors::ForgeflowError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{FsArtifactWriter, README_PATH, REQUIREMENTS_PATH};
    use crate::service::{Capabilities, GenerationService};
    use crate::store::{InMemoryPersistence, RunRecordStore};
    use crate::testing::{
        assert_failed_with, assert_no_duplicates, assert_progress_monotonic,
        assert_succeeded_with, count_kind, eventually, within, FailingPersistence, Gate,
        MemoryArtifactWriter, ScriptedGenerator, ScriptedPlanner, TestHarness,
    };
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn gated_generation(paths: &[&str]) -> (TestHarness, Gate, Arc<ScriptedGenerator>) {
        let gate = Gate::new();
        let generator = Arc::new(ScriptedGenerator::new().with_gate(gate.clone()));
        let harness = TestHarness::with_parts(
            Arc::new(ScriptedPlanner::with_paths(paths)),
            generator.clone(),
            Arc::new(MemoryArtifactWriter::new()),
            ForgeflowConfig::default(),
        );
        (harness, gate, generator)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let harness = TestHarness::with_paths(&["app.py", "README.md"]);
        let record = harness.run("Todo App").await;

        assert_succeeded_with(&record, &[REQUIREMENTS_PATH, "app.py", "README.md"]);
        assert_eq!(
            harness.writer.read(&record.output_location, "app.py"),
            Some(ScriptedGenerator::content_for("app.py"))
        );
        assert!(harness.service.active_jobs().is_empty());

        let events = harness.events_for(record.id);
        assert_no_duplicates(&events);
        assert_progress_monotonic(&events, record.id);
        assert_eq!(events.last().map(|e| e.kind()), Some("status"));
        assert_eq!(events.iter().filter_map(|e| e.percent()).last(), Some(100));
        assert_eq!(count_kind(&events, record.id, "error"), 0);
    }

    #[tokio::test]
    async fn test_missing_readme_is_synthesised() {
        let harness = TestHarness::with_paths(&["main.rs"]);
        let record = harness.run("cli").await;

        assert_succeeded_with(&record, &[REQUIREMENTS_PATH, "main.rs", README_PATH]);
        let readme = harness
            .writer
            .read(&record.output_location, README_PATH)
            .unwrap();
        assert!(readme.contains("main.rs"));
        assert!(readme.contains("description of cli"));
    }

    #[tokio::test]
    async fn test_failed_artifact_is_skipped() {
        let harness = TestHarness::new(
            ScriptedPlanner::with_paths(&["one.py", "two.py"]),
            ScriptedGenerator::new().failing_on("two.py"),
        );
        let record = harness.run("partial").await;

        assert_succeeded_with(&record, &[REQUIREMENTS_PATH, "one.py", README_PATH]);
        assert_eq!(record.artifact_paths.len(), 3);
        let errors = harness.events.events_of_kind("error");
        assert!(!errors.is_empty());
        assert_eq!(errors[0].artifact(), Some("two.py"));
    }

    #[tokio::test]
    async fn test_second_of_three_failing_keeps_the_rest() {
        let harness = TestHarness::new(
            ScriptedPlanner::with_paths(&["one.py", "two.py", "three.py"]),
            ScriptedGenerator::new().failing_on("two.py"),
        );
        let record = harness.run("partial").await;

        assert_succeeded_with(
            &record,
            &[REQUIREMENTS_PATH, "one.py", "three.py", README_PATH],
        );
        assert!(count_kind(&harness.events_for(record.id), record.id, "error") >= 1);
    }

    #[tokio::test]
    async fn test_artifacts_are_within_plan() {
        let planned = ["a.rs", "b.rs", "c.rs"];
        let harness = TestHarness::new(
            ScriptedPlanner::with_paths(&planned),
            ScriptedGenerator::new().failing_on("a.rs"),
        );
        let record = harness.run("subset").await;

        let allowed: HashSet<&str> = planned
            .iter()
            .copied()
            .chain([REQUIREMENTS_PATH, README_PATH])
            .collect();
        for path in &record.artifact_paths {
            assert!(allowed.contains(path.as_str()), "unexpected artifact {path}");
        }
        assert!(record.artifact_paths.iter().any(|p| p == "b.rs"));
        assert!(record.artifact_paths.iter().any(|p| is_readme_path(p)));
    }

    #[tokio::test]
    async fn test_cancel_before_generation() {
        let gate = Gate::new();
        let generator = Arc::new(ScriptedGenerator::new());
        let harness = TestHarness::with_parts(
            Arc::new(ScriptedPlanner::with_paths(&["x.py", "y.py"]).with_gate(gate.clone())),
            generator.clone(),
            Arc::new(MemoryArtifactWriter::new()),
            ForgeflowConfig::default(),
        );

        let id = harness.start("stop me").await;
        harness.service.cancel_job(id);
        gate.open();
        within(WAIT, harness.service.wait_idle()).await;

        let record = harness.record(id);
        assert_failed_with(&record, REASON_STOPPED_BY_USER);
        assert!(record.was_cancelled());
        assert!(record.artifact_paths.len() <= 1);
        assert!(record
            .artifact_paths
            .iter()
            .all(|p| p == REQUIREMENTS_PATH));
        assert!(generator.calls().is_empty());
        assert!(count_kind(&harness.events_for(id), id, "error") >= 1);
    }

    #[tokio::test]
    async fn test_cancel_between_artifacts() {
        let (harness, gate, generator) = gated_generation(&["a.py", "b.py", "c.py"]);
        let id = harness.start("midway").await;

        within(WAIT, eventually(WAIT, || generator.calls().len() == 1)).await;
        harness.service.cancel_job(id);
        gate.open();
        within(WAIT, harness.service.wait_idle()).await;

        let record = harness.record(id);
        assert_failed_with(&record, REASON_STOPPED_BY_USER);
        // The in-flight call finishes; nothing after it starts.
        assert_eq!(record.artifact_paths, vec![REQUIREMENTS_PATH, "a.py"]);
        assert_eq!(generator.calls(), vec!["a.py".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (harness, gate, generator) = gated_generation(&["a.py", "b.py"]);
        let id = harness.start("twice").await;
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;

        harness.service.cancel_job(id);
        harness.service.cancel_job(id);
        gate.open();
        within(WAIT, harness.service.wait_idle()).await;

        let record = harness.record(id);
        assert_failed_with(&record, REASON_STOPPED_BY_USER);
        let failures = harness
            .events_for(id)
            .into_iter()
            .filter(|e| {
                matches!(
                    e.payload,
                    EventPayload::Status {
                        phase: JobPhase::Failed,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(failures, 1);

        harness.service.cancel_job(id);
        assert_eq!(harness.record(id), record);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_changes_nothing() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let done = harness.run("finished").await;

        harness.service.cancel_job(JobId::new());
        harness.service.cancel_job(done.id);

        assert_eq!(harness.service.list_runs(), vec![done]);
    }

    #[tokio::test]
    async fn test_cancel_all_jobs() {
        let (harness, gate, generator) = gated_generation(&["a.py", "b.py"]);
        let first = harness.start("one").await;
        let second = harness.start("two").await;
        within(WAIT, eventually(WAIT, || generator.calls().len() == 2)).await;

        assert_eq!(harness.service.cancel_all_jobs(), 2);
        gate.open();
        within(WAIT, harness.service.wait_idle()).await;

        for id in [first, second] {
            assert_failed_with(&harness.record(id), REASON_STOPPED_BY_USER);
        }
        assert_eq!(harness.service.cancel_all_jobs(), 0);
    }

    #[tokio::test]
    async fn test_planning_failure_fails_the_run() {
        let harness = TestHarness::new(
            ScriptedPlanner::failing("model offline"),
            ScriptedGenerator::new(),
        );
        let record = harness.run("doomed").await;

        assert_eq!(record.status, RunStatus::Failed);
        let reason = record.failure_reason.clone().unwrap();
        assert!(reason.starts_with("planning failed:"), "{reason}");
        assert!(reason.contains("model offline"));
        assert!(record.artifact_paths.is_empty());
        assert!(!record.was_cancelled());
        assert!(count_kind(&harness.events_for(record.id), record.id, "error") >= 1);
    }

    #[tokio::test]
    async fn test_finalization_failure_fails_the_run() {
        let writer = Arc::new(MemoryArtifactWriter::new().failing_on(README_PATH));
        let harness = TestHarness::with_parts(
            Arc::new(ScriptedPlanner::with_paths(&["main.go"])),
            Arc::new(ScriptedGenerator::new()),
            writer,
            ForgeflowConfig::default(),
        );
        let record = harness.run("no readme").await;

        assert_eq!(record.status, RunStatus::Failed);
        assert!(record
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("finalization failed:"));
        assert_eq!(record.artifact_paths, vec![REQUIREMENTS_PATH, "main.go"]);
    }

    #[tokio::test]
    async fn test_reset_system() {
        let (harness, gate, generator) = gated_generation(&["a.py", "b.py"]);
        let stuck = harness.start("stuck").await;
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;

        assert_eq!(harness.service.reset_system().await.unwrap(), 1);
        assert_failed_with(&harness.record(stuck), REASON_INTERRUPTED);
        assert!(harness.service.active_jobs().is_empty());
        assert!(harness.service.bus().replay().is_empty());

        let late = Arc::new(CollectingEventSink::new());
        harness.service.attach(late.clone());
        assert!(late.is_empty());

        // The wedged call returns after the reset; its writes are rejected.
        gate.open();
        within(WAIT, harness.service.wait_idle()).await;
        let record = harness.record(stuck);
        assert_failed_with(&record, REASON_INTERRUPTED);
        assert_eq!(record.artifact_paths, vec![REQUIREMENTS_PATH]);
        assert_eq!(generator.calls(), vec!["a.py".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_leaves_terminal_records_alone() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let done = harness.run("done").await;

        assert_eq!(harness.service.reset_system().await.unwrap(), 0);
        assert_eq!(harness.record(done.id), done);
    }

    #[tokio::test]
    async fn test_late_observer_gets_history_then_live_events() {
        let (harness, gate, generator) = gated_generation(&["a.py", "b.py"]);
        let id = harness.start("observed").await;
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;

        let late = Arc::new(CollectingEventSink::new());
        harness.service.attach(late.clone());
        let replayed = late.len();
        assert!(replayed > 0);

        gate.open();
        within(WAIT, harness.service.wait_idle()).await;

        let seen_late = late.events_for(id);
        assert!(seen_late.len() > replayed);
        assert_no_duplicates(&seen_late);
        assert_eq!(seen_late, harness.events_for(id));
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let (_sub, mut rx) = harness.service.subscribe_channel();
        let record = harness.run("streamed").await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received, harness.events_for(record.id));
        assert!(received.iter().all(|e| e.to_json().is_ok()));
    }

    #[tokio::test]
    async fn test_disconnected_observer_is_dropped() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let gone = Arc::new(CollectingEventSink::new());
        harness.service.attach(gone.clone());
        gone.close();

        let record = harness.run("survives").await;
        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(harness.service.bus().observer_count(), 1);
        assert!(harness.service.bus().metrics().evicted() >= 1);
    }

    #[tokio::test]
    async fn test_detach_stops_delivery() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let sink = Arc::new(CollectingEventSink::new());
        let sub = harness.service.attach(sink.clone());
        assert!(harness.service.detach(sub));
        assert!(!harness.service.detach(sub));

        harness.run("unobserved").await;
        assert!(sink.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jobs_do_not_interfere() {
        let harness = TestHarness::new(
            ScriptedPlanner::with_paths(&["a.py", "b.py", "c.py"]),
            ScriptedGenerator::new().with_delay(Duration::from_millis(2)),
        );
        let starts = (0..6).map(|i| {
            let harness = &harness;
            async move { harness.start(&format!("job {i}")).await }
        });
        let ids: Vec<JobId> = futures::future::join_all(starts).await;
        within(WAIT, harness.service.wait_idle()).await;

        let locations: HashSet<PathBuf> = ids
            .iter()
            .map(|id| harness.record(*id).output_location)
            .collect();
        assert_eq!(locations.len(), ids.len());

        for id in ids {
            let record = harness.record(id);
            assert_succeeded_with(
                &record,
                &[REQUIREMENTS_PATH, "a.py", "b.py", "c.py", README_PATH],
            );
            let events = harness.events_for(id);
            assert_no_duplicates(&events);
            assert_progress_monotonic(&events, id);
        }
    }

    #[tokio::test]
    async fn test_status_transitions_once() {
        let harness = TestHarness::with_paths(&["a.py"]);
        let record = harness.run("once").await;

        let err = harness
            .service
            .store()
            .mark_failed(record.id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeflowError::AlreadyTerminal { .. }));
        assert_eq!(harness.record(record.id).status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_delete_run_cancels_and_removes() {
        let (harness, gate, generator) = gated_generation(&["a.py"]);
        let id = harness.start("deleted").await;
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;

        harness.service.delete_run(id).await.unwrap();
        assert!(harness.service.get_run(id).is_none());

        gate.open();
        within(WAIT, harness.service.wait_idle()).await;
        assert!(harness.service.get_run(id).is_none());
        assert!(harness.service.active_jobs().is_empty());
        assert!(matches!(
            harness.service.delete_run(id).await,
            Err(ForgeflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_during_generation_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new();
        let generator = Arc::new(ScriptedGenerator::new().with_gate(gate.clone()));
        let config = ForgeflowConfig::default().with_output_root(dir.path());
        let store = Arc::new(RunRecordStore::in_memory(dir.path()));
        let capabilities = Capabilities::new(
            Arc::new(ScriptedPlanner::with_paths(&["a.py"])),
            generator.clone(),
            Arc::new(FsArtifactWriter),
        );
        let service = GenerationService::with_store(config, store, capabilities).unwrap();

        let id = service.start_job("deleted", "d", None).await.unwrap();
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;
        let location = service.get_run(id).unwrap().output_location;
        assert!(location.join(REQUIREMENTS_PATH).exists());

        service.delete_run(id).await.unwrap();
        assert!(!location.exists());

        gate.open();
        within(WAIT, service.wait_idle()).await;
        assert!(service.get_run(id).is_none());
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_start_job_leaves_nothing_when_persistence_fails() {
        let store = Arc::new(
            RunRecordStore::open("output", Arc::new(FailingPersistence))
                .await
                .unwrap(),
        );
        let capabilities = Capabilities::new(
            Arc::new(ScriptedPlanner::with_paths(&["a.py"])),
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryArtifactWriter::new()),
        );
        let service =
            GenerationService::with_store(ForgeflowConfig::default(), store, capabilities).unwrap();

        let err = service.start_job("unsaved", "d", None).await.unwrap_err();
        assert!(matches!(err, ForgeflowError::Persistence(_)));
        assert!(service.list_runs().is_empty());
        assert!(service.active_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_wait_idle_leaves_jobs_running() {
        let (harness, gate, generator) = gated_generation(&["a.py"]);
        let id = harness.start("patient").await;
        within(WAIT, eventually(WAIT, || !generator.calls().is_empty())).await;

        let waited =
            tokio::time::timeout(Duration::from_millis(50), harness.service.wait_idle()).await;
        assert!(waited.is_err());
        assert_eq!(harness.service.active_jobs(), vec![id]);

        gate.open();
        within(WAIT, harness.service.wait_idle()).await;
        assert_succeeded_with(&harness.record(id), &[REQUIREMENTS_PATH, "a.py", README_PATH]);
    }

    #[tokio::test]
    async fn test_open_reconciles_interrupted_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ForgeflowConfig::default()
            .with_output_root(dir.path())
            .with_records_path(dir.path().join("runs.json"));

        let orphan = {
            let persistence = Arc::new(crate::store::JsonFilePersistence::new(
                &config.records_path,
            ));
            let store = RunRecordStore::open(dir.path(), persistence).await.unwrap();
            store.create("orphan", "left running", "m").await.unwrap()
        };

        let capabilities = Capabilities::new(
            Arc::new(ScriptedPlanner::with_paths(&[])),
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryArtifactWriter::new()),
        );
        let service = GenerationService::open(config, capabilities).await.unwrap();
        assert_failed_with(&service.get_run(orphan).unwrap(), REASON_INTERRUPTED);
    }

    #[tokio::test]
    async fn test_every_record_write_is_persisted() {
        let backend = Arc::new(InMemoryPersistence::new());
        let store = Arc::new(RunRecordStore::open("output", backend.clone()).await.unwrap());
        let capabilities = Capabilities::new(
            Arc::new(ScriptedPlanner::with_paths(&["a.py"])),
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryArtifactWriter::new()),
        );
        let service =
            GenerationService::with_store(ForgeflowConfig::default(), store, capabilities).unwrap();

        let id = service.start_job("persisted", "d", None).await.unwrap();
        service.wait_idle().await;

        let snapshot: Vec<RunRecord> = backend.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].status, RunStatus::Succeeded);
        assert_eq!(snapshot[0].artifact_paths.len(), 3);
    }
}
