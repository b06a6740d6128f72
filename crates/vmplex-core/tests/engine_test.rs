#![allow(clippy::unwrap_used, clippy::expect_used)]
// Integration tests driving the full engine against `MemoryProvider`.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use vmplex_core::{
    ChangeKind, ChangeNotification, Command, CommandResult, CoreError, EnabledState, Engine,
    EngineConfig, EngineState, Heartbeat, InstanceSnapshot, MemoryProvider, MergeStats,
    PollOutcome, SummaryRecord, VmGuid,
};

// ── Helpers ─────────────────────────────────────────────────────────

const A: &str = "6A1D8E2C-0000-4000-8000-00000000000A";
const B: &str = "6A1D8E2C-0000-4000-8000-00000000000B";
const C: &str = "6A1D8E2C-0000-4000-8000-00000000000C";

fn quiet_config() -> EngineConfig {
    EngineConfig::default()
        .with_poll_interval(Duration::from_secs(3600))
        .without_initial_poll()
}

async fn start(provider: &MemoryProvider, config: EngineConfig) -> Engine {
    Engine::connect(Arc::new(provider.clone()), config)
        .await
        .expect("engine should start")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn names(engine: &Engine) -> Vec<String> {
    engine.snapshot().iter().map(|e| e.name()).collect()
}

fn metrics(guid: &str, load: u16) -> SummaryRecord {
    SummaryRecord {
        processor_load: Some(load),
        memory_usage_mb: Some(2048),
        heartbeat: Some(Heartbeat::Ok),
        uptime: Some(Duration::from_secs(60)),
        memory_available_pct: Some(40),
        ..SummaryRecord::new(guid)
    }
}

// ── Reconciliation scenarios ────────────────────────────────────────

#[tokio::test]
async fn test_events_and_polls_reconcile_in_order() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;
    let mut removals = engine.removals();
    assert_eq!(names(&engine), vec!["alpha"]);

    provider.create_instance(InstanceSnapshot::new(B, "beta"));
    eventually(|| engine.store().len() == 2).await;
    assert_eq!(names(&engine), vec!["alpha", "beta"]);

    provider.modify_instance(InstanceSnapshot::new(A, "X"));
    eventually(|| engine.resolve(A).unwrap().name() == "X").await;
    assert_eq!(engine.resolve(B).unwrap().name(), "beta");

    provider.set_metrics(metrics(A, 25));
    provider.set_metrics(metrics(B, 75));
    let outcome = engine.poll_now().await.unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Merged(MergeStats {
            applied: 2,
            unknown: 0
        })
    );
    let a = engine.resolve(A).unwrap();
    assert_eq!(a.name(), "X");
    assert_eq!(a.summary().processor_load, Some(25));
    assert_eq!(engine.resolve(B).unwrap().summary().processor_load, Some(75));

    provider.delete_instance(&VmGuid::new(A));
    eventually(|| engine.store().len() == 1).await;
    assert_eq!(engine.store().guids(), vec![VmGuid::new(B)]);

    let removed = removals.recv().await.unwrap();
    assert_eq!(removed.guid, VmGuid::new(A));
    assert_eq!(removed.name(), "X");
    assert_eq!(removed.summary.processor_load, Some(25));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_creation_racing_initial_snapshot_keeps_one_entry() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(C, "from-snapshot"));
    let engine = start(&provider, quiet_config()).await;

    provider.emit(ChangeNotification::created(InstanceSnapshot::new(
        C,
        "from-event",
    )));
    provider.create_instance(InstanceSnapshot::new(B, "marker"));
    eventually(|| engine.store().contains(&VmGuid::new(B))).await;

    let copies = engine
        .snapshot()
        .iter()
        .filter(|e| e.guid() == &VmGuid::new(C))
        .count();
    assert_eq!(copies, 1);
    assert_eq!(engine.resolve(C).unwrap().name(), "from-snapshot");

    provider.modify_instance(InstanceSnapshot::new(C, "renamed"));
    eventually(|| engine.resolve(C).unwrap().name() == "renamed").await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_repeated_deletion_is_a_noop() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.insert_instance(InstanceSnapshot::new(B, "beta"));
    let engine = start(&provider, quiet_config()).await;
    let mut removals = engine.removals();

    let gone = InstanceSnapshot::new(A, "alpha");
    provider.emit(ChangeNotification::deleted(gone.clone()));
    provider.emit(ChangeNotification::deleted(gone));
    provider.delete_instance(&VmGuid::new(B));
    eventually(|| engine.store().is_empty()).await;

    assert_eq!(removals.recv().await.unwrap().name(), "alpha");
    assert_eq!(removals.recv().await.unwrap().name(), "beta");
    assert!(removals.try_recv().is_err());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_modification_for_unknown_vm_is_dropped() {
    let provider = MemoryProvider::new();
    let engine = start(&provider, quiet_config()).await;

    provider.emit(ChangeNotification::modified(
        None,
        InstanceSnapshot::new(A, "ghost"),
    ));
    provider.create_instance(InstanceSnapshot::new(B, "marker"));
    eventually(|| engine.store().contains(&VmGuid::new(B))).await;
    // Modifications travel on their own feed; give it a moment to drain.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(engine.resolve(A).is_none());
    assert_eq!(engine.store().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unmanaged_systems_are_not_mirrored() {
    let provider = MemoryProvider::new();
    provider.insert_instance(
        InstanceSnapshot::new("HOST", "HYPERVISOR").with_caption("Hosting Computer System"),
    );
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;

    assert_eq!(names(&engine), vec!["alpha"]);
    engine.shutdown().await;
}

// ── Summary polling ─────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_poll_fills_metrics_before_running() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.set_metrics(metrics(A, 12));

    let config = EngineConfig::default().with_poll_interval(Duration::from_secs(3600));
    let engine = start(&provider, config).await;

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.resolve(A).unwrap().summary().processor_load, Some(12));
    assert!(engine.store().last_summary_update().is_some());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_poll_keeps_stale_metrics_and_loop_recovers() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.set_metrics(metrics(A, 10));

    let config = EngineConfig::default().with_poll_interval(Duration::from_millis(20));
    let engine = start(&provider, config).await;
    assert_eq!(engine.resolve(A).unwrap().summary().processor_load, Some(10));

    provider.set_metrics(metrics(A, 99));
    provider.set_summary_status(32768);
    let failed_from = provider.summary_query_count();
    eventually(|| provider.summary_query_count() >= failed_from + 3).await;
    assert_eq!(engine.resolve(A).unwrap().summary().processor_load, Some(10));

    provider.set_summary_status(0);
    eventually(|| engine.resolve(A).unwrap().summary().processor_load == Some(99)).await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_deletion_during_poll_does_not_resurrect_entry() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.insert_instance(InstanceSnapshot::new(B, "beta"));
    provider.set_metrics(metrics(A, 30));
    provider.set_metrics(metrics(B, 40));
    let engine = start(&provider, quiet_config()).await;

    provider.pause_summary_queries();
    let polling = engine.clone();
    let poll = tokio::spawn(async move { polling.poll_now().await });
    eventually(|| provider.summary_query_count() == 1).await;

    provider.emit(ChangeNotification::deleted(InstanceSnapshot::new(A, "alpha")));
    eventually(|| !engine.store().contains(&VmGuid::new(A))).await;
    provider.resume_summary_queries();

    let outcome = poll.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Merged(MergeStats {
            applied: 1,
            unknown: 1
        })
    );
    assert!(engine.resolve(A).is_none());
    assert_eq!(engine.resolve(B).unwrap().summary().processor_load, Some(40));

    engine.shutdown().await;
}

// ── Startup failures ────────────────────────────────────────────────

#[tokio::test]
async fn test_management_unavailable_is_fatal() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.set_management_available(false);

    let engine = Engine::new(Arc::new(provider.clone()), quiet_config());
    let err = engine.start().await.unwrap_err();

    assert!(
        matches!(err, CoreError::ManagementUnavailable { .. }),
        "expected ManagementUnavailable, got: {err:?}"
    );
    assert!(err.is_fatal());
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_connection_failure_is_fatal() {
    let provider = MemoryProvider::new();
    provider.fail_connect("RPC server unavailable");

    let engine = Engine::new(Arc::new(provider), quiet_config());
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_subscription_failure_aborts_before_snapshot() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    provider.fail_subscription(ChangeKind::Modification);

    let engine = Engine::new(Arc::new(provider), quiet_config());
    let err = engine.start().await.unwrap_err();

    match err {
        CoreError::SubscriptionFailed { kind, .. } => assert_eq!(kind, "modification"),
        other => panic!("expected SubscriptionFailed, got: {other:?}"),
    }
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_snapshot_failure_is_fatal() {
    let provider = MemoryProvider::new();
    provider.fail_list_instances(true);

    let engine = Engine::new(Arc::new(provider), quiet_config());
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, CoreError::SnapshotFailed { .. }));
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test]
async fn test_engine_starts_only_once() {
    let provider = MemoryProvider::new();
    let engine = start(&provider, quiet_config()).await;
    assert!(matches!(
        engine.start().await,
        Err(CoreError::AlreadyStarted)
    ));
    engine.shutdown().await;
}

// ── Lifecycle and commands ──────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_stops_reconciliation() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;

    engine.shutdown().await;
    engine.shutdown().await;
    assert_eq!(engine.state(), EngineState::Stopped);

    provider.create_instance(InstanceSnapshot::new(B, "beta"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.store().len(), 1);

    let err = engine
        .execute(Command::Start {
            guid: VmGuid::new(A),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EngineStopped));
}

#[tokio::test]
async fn test_start_command_settles_through_modification_feed() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;

    let result = engine
        .execute(Command::Start {
            guid: VmGuid::new(A),
        })
        .await
        .unwrap();

    let CommandResult::Completed(snapshot) = result else {
        panic!("expected a synchronous completion");
    };
    assert_eq!(snapshot.main.enabled_state, EnabledState::Off);
    assert_eq!(
        provider.state_changes(),
        vec![(VmGuid::new(A), vmplex_core::RequestedState::Running)]
    );

    eventually(|| engine.resolve("alpha").unwrap().enabled_state() == EnabledState::Running)
        .await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_command_does_not_publish_unannounced_attributes() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;

    // Renamed on the hypervisor side without a modification notification.
    provider.insert_instance(InstanceSnapshot::new(A, "renamed-quietly"));
    provider.set_state_change_status(vmplex_core::provider::STATUS_JOB_STARTED);

    let result = engine
        .execute(Command::Start {
            guid: VmGuid::new(A),
        })
        .await
        .unwrap();

    assert!(matches!(result, CommandResult::JobStarted(_)));
    assert_eq!(result.snapshot().name(), "alpha");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(names(&engine), vec!["alpha"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_command_errors() {
    let provider = MemoryProvider::new();
    provider.insert_instance(InstanceSnapshot::new(A, "alpha"));
    let engine = start(&provider, quiet_config()).await;

    let err = engine
        .execute(Command::Save {
            guid: VmGuid::new(B),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::VmNotFound { .. }));
    assert!(provider.state_changes().is_empty());

    provider.set_state_change_status(32775);
    let err = engine
        .execute(Command::TurnOff {
            guid: VmGuid::new(A),
        })
        .await
        .unwrap_err();
    match err {
        CoreError::OperationFailed { operation, status } => {
            assert_eq!(operation, "turn-off");
            assert_eq!(status, 32775);
        }
        other => panic!("expected OperationFailed, got: {other:?}"),
    }
    assert_eq!(engine.resolve(A).unwrap().enabled_state(), EnabledState::Off);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_vm_stream_sees_creations() {
    let provider = MemoryProvider::new();
    let engine = start(&provider, quiet_config()).await;
    let mut vms = engine.vms();
    assert!(vms.current().is_empty());

    provider.create_instance(InstanceSnapshot::new(A, "alpha"));
    let list = tokio::time::timeout(Duration::from_secs(2), vms.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name(), "alpha");

    engine.shutdown().await;
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_converge_to_net_notifications() {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;

    let provider = MemoryProvider::new();
    let engine = start(
        &provider,
        EngineConfig::default().with_poll_interval(Duration::from_millis(10)),
    )
    .await;

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let engine = engine.clone();
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            while !done.load(Ordering::SeqCst) {
                let guids: Vec<VmGuid> =
                    engine.snapshot().iter().map(|e| e.guid().clone()).collect();
                let unique: BTreeSet<&VmGuid> = guids.iter().collect();
                assert_eq!(unique.len(), guids.len(), "duplicate guid in snapshot");
                tokio::task::yield_now().await;
            }
        })
    };

    let mut expected = BTreeSet::new();
    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        for i in (1..PER_PRODUCER).step_by(2) {
            expected.insert(VmGuid::new(format!("{p:08}-0000-4000-8000-{i:012}")));
        }
        let provider = provider.clone();
        producers.push(std::thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                let guid = format!("{p:08}-0000-4000-8000-{i:012}");
                provider.set_metrics(metrics(&guid, 7));
                provider.create_instance(InstanceSnapshot::new(guid.as_str(), "x"));
                provider.modify_instance(InstanceSnapshot::new(guid.as_str(), "y"));
                if i % 2 == 0 {
                    provider.delete_instance(&VmGuid::new(&guid));
                }
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    eventually(|| {
        let snapshot = engine.snapshot();
        snapshot.len() == expected.len()
            && snapshot.iter().all(|e| e.name() == "y" && e.summary().processor_load == Some(7))
    })
    .await;

    let mirrored: BTreeSet<VmGuid> = engine.snapshot().iter().map(|e| e.guid().clone()).collect();
    assert_eq!(mirrored, expected);

    done.store(true, Ordering::SeqCst);
    reader.await.unwrap();
    engine.shutdown().await;
}
