//! Integration tests for the task graph engine: dependency semantics,
//! checkpoint rollback, and the scheduling order.

use hivecore::services::{EventBus, EventPayload, TaskGraphEngine};
use hivecore::{
    Checkpoint, DependencyKind, RollbackStrategy, SwarmError, TaskDependency, TaskFilter, TaskSpec,
    TaskStatus, WorkflowSpec,
};
use uuid::Uuid;

fn engine() -> TaskGraphEngine {
    TaskGraphEngine::new(EventBus::new(128))
}

async fn run_to_completion(engine: &TaskGraphEngine, task_id: Uuid) {
    engine
        .mark_assigned(task_id, Uuid::new_v4())
        .await
        .expect("assign");
    engine.mark_in_progress(task_id).await.expect("start");
    engine.finish_task(task_id, true).await.expect("finish");
}

#[tokio::test]
async fn test_mixed_dependency_kinds_pipeline() {
    let engine = engine();

    // build -> test (finish-to-start), docs follows build's start
    // (start-to-start), release must not finish before test finishes
    // (finish-to-finish).
    let build = engine
        .create_task(TaskSpec::new("build", "compile"))
        .await
        .unwrap();
    let test = engine
        .create_task(
            TaskSpec::new("test", "run tests")
                .with_dependency(TaskDependency::finish_to_start(build.id)),
        )
        .await
        .unwrap();
    let docs = engine
        .create_task(
            TaskSpec::new("docs", "write docs")
                .with_dependency(TaskDependency::new(build.id, DependencyKind::StartToStart)),
        )
        .await
        .unwrap();
    let release = engine
        .create_task(
            TaskSpec::new("release", "cut release")
                .with_dependency(TaskDependency::new(test.id, DependencyKind::FinishToFinish)),
        )
        .await
        .unwrap();

    // Initially only build and release can start.
    let ready: Vec<Uuid> = engine
        .schedulable_tasks()
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    assert!(ready.contains(&build.id));
    assert!(ready.contains(&release.id));
    assert!(!ready.contains(&test.id));
    assert!(!ready.contains(&docs.id));

    // Once build starts, docs unblocks; test still waits for completion.
    engine.mark_assigned(build.id, Uuid::new_v4()).await.unwrap();
    engine.mark_in_progress(build.id).await.unwrap();
    let ready: Vec<Uuid> = engine
        .schedulable_tasks()
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    assert!(ready.contains(&docs.id));
    assert!(!ready.contains(&test.id));

    engine.finish_task(build.id, true).await.unwrap();
    let ready: Vec<Uuid> = engine
        .schedulable_tasks()
        .await
        .iter()
        .map(|t| t.id)
        .collect();
    assert!(ready.contains(&test.id));

    // Release cannot complete until test completed.
    engine
        .mark_assigned(release.id, Uuid::new_v4())
        .await
        .unwrap();
    engine.mark_in_progress(release.id).await.unwrap();
    assert!(!engine.can_complete(release.id).await.unwrap());
    assert!(engine.finish_task(release.id, true).await.is_err());

    run_to_completion(&engine, test.id).await;
    assert!(engine.can_complete(release.id).await.unwrap());
    engine.finish_task(release.id, true).await.unwrap();
}

#[tokio::test]
async fn test_cycle_rejected_without_partial_mutation() {
    let engine = engine();
    let a = engine.create_task(TaskSpec::new("t", "a")).await.unwrap();
    let b = engine
        .create_task(TaskSpec::new("t", "b").with_dependency(TaskDependency::finish_to_start(a.id)))
        .await
        .unwrap();
    let c = engine
        .create_task(TaskSpec::new("t", "c").with_dependency(TaskDependency::finish_to_start(b.id)))
        .await
        .unwrap();

    let err = engine
        .add_dependency(a.id, TaskDependency::finish_to_start(c.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::DependencyCycle(_)));

    // The rejected edge left the task untouched.
    let view = engine.get_task_status(a.id).await.unwrap();
    assert!(view.task.dependencies.is_empty());
}

#[tokio::test]
async fn test_cancel_with_rollback_surfaces_latest_checkpoint() {
    let engine = engine();
    let task = engine
        .create_task(
            TaskSpec::new("migrate", "long migration")
                .with_rollback_strategy(RollbackStrategy::PreviousCheckpoint),
        )
        .await
        .unwrap();
    engine.mark_assigned(task.id, Uuid::new_v4()).await.unwrap();
    engine.mark_in_progress(task.id).await.unwrap();

    engine
        .add_checkpoint(
            task.id,
            Checkpoint::new("schema migrated", serde_json::json!({"step": 1})),
        )
        .await
        .unwrap();
    engine
        .add_checkpoint(
            task.id,
            Checkpoint::new("data copied", serde_json::json!({"step": 2})),
        )
        .await
        .unwrap();

    let outcome = engine
        .cancel_task(task.id, "operator abort", true)
        .await
        .unwrap();
    assert_eq!(outcome.task.status, TaskStatus::Cancelled);
    assert_eq!(
        outcome.task.cancellation_reason.as_deref(),
        Some("operator abort")
    );
    // The latest checkpoint is the rollback target.
    let checkpoint = outcome.rollback_checkpoint.expect("rollback checkpoint");
    assert_eq!(checkpoint.description, "data copied");

    // Cancelled is terminal.
    let err = engine.finish_task(task.id, true).await.unwrap_err();
    assert!(matches!(err, SwarmError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_cancel_without_rollback_strategy_has_no_checkpoint() {
    let engine = engine();
    let task = engine
        .create_task(TaskSpec::new("t", "no rollback"))
        .await
        .unwrap();
    engine
        .add_checkpoint(task.id, Checkpoint::new("saved", serde_json::json!({})))
        .await
        .unwrap();

    let outcome = engine.cancel_task(task.id, "abort", true).await.unwrap();
    assert!(outcome.rollback_checkpoint.is_none());
}

#[tokio::test]
async fn test_list_tasks_combined_filters() {
    let engine = engine();
    let urgent = engine
        .create_task(
            TaskSpec::new("deploy", "urgent deploy")
                .with_priority(90)
                .with_tag("prod"),
        )
        .await
        .unwrap();
    engine
        .create_task(
            TaskSpec::new("deploy", "staging deploy")
                .with_priority(90)
                .with_tag("staging"),
        )
        .await
        .unwrap();
    engine
        .create_task(
            TaskSpec::new("cleanup", "low prio prod")
                .with_priority(20)
                .with_tag("prod"),
        )
        .await
        .unwrap();

    let filter = TaskFilter {
        task_type: Some("deploy".to_string()),
        tags: Some(std::iter::once("prod".to_string()).collect()),
        priority_min: Some(80),
        ..TaskFilter::default()
    };
    let tasks = engine.list_tasks(&filter).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, urgent.id);

    let by_status = engine
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::Pending),
            ..TaskFilter::default()
        })
        .await;
    assert_eq!(by_status.len(), 3);
}

#[tokio::test]
async fn test_sequential_workflow_runs_one_at_a_time() {
    let engine = engine();
    let wf = engine
        .create_workflow(WorkflowSpec::new("pipeline").sequential())
        .await
        .unwrap();
    let first = engine
        .create_task(TaskSpec::new("t", "step 1").with_workflow(wf.id))
        .await
        .unwrap();
    engine
        .create_task(TaskSpec::new("t", "step 2").with_workflow(wf.id))
        .await
        .unwrap();

    let batch = engine.schedulable_tasks().await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, first.id);

    engine.mark_assigned(first.id, Uuid::new_v4()).await.unwrap();
    // Slot occupied: nothing schedulable until the first task finishes.
    assert!(engine.schedulable_tasks().await.is_empty());

    engine.mark_in_progress(first.id).await.unwrap();
    engine.finish_task(first.id, true).await.unwrap();
    assert_eq!(engine.schedulable_tasks().await.len(), 1);
}

#[tokio::test]
async fn test_task_events_are_emitted_in_order() {
    let bus = EventBus::new(128);
    let mut rx = bus.subscribe();
    let engine = TaskGraphEngine::new(bus);

    let task = engine
        .create_task(TaskSpec::new("t", "observed"))
        .await
        .unwrap();
    run_to_completion(&engine, task.id).await;

    let mut topics = Vec::new();
    while let Ok(event) = rx.try_recv() {
        topics.push(event.payload.topic());
    }
    assert_eq!(
        topics,
        vec!["task:created", "task:assigned", "task:started", "task:completed"]
    );
}

#[tokio::test]
async fn test_failure_does_not_require_completion_gates() {
    let engine = engine();
    let dep = engine.create_task(TaskSpec::new("t", "gate")).await.unwrap();
    let task = engine
        .create_task(
            TaskSpec::new("t", "may fail")
                .with_dependency(TaskDependency::new(dep.id, DependencyKind::FinishToFinish)),
        )
        .await
        .unwrap();

    engine.mark_assigned(task.id, Uuid::new_v4()).await.unwrap();
    engine.mark_in_progress(task.id).await.unwrap();
    // Failing is always allowed even while the gate is unsatisfied.
    let failed = engine.finish_task(task.id, false).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_event_payload_carries_cancellation_details() {
    let bus = EventBus::new(128);
    let mut rx = bus.subscribe();
    let engine = TaskGraphEngine::new(bus);

    let task = engine
        .create_task(
            TaskSpec::new("t", "watched")
                .with_rollback_strategy(RollbackStrategy::PreviousCheckpoint),
        )
        .await
        .unwrap();
    let checkpoint = engine
        .add_checkpoint(task.id, Checkpoint::new("mid", serde_json::json!({})))
        .await
        .unwrap();
    engine.cancel_task(task.id, "shutdown", true).await.unwrap();

    let mut cancelled = None;
    while let Ok(event) = rx.try_recv() {
        if let EventPayload::TaskCancelled {
            task_id,
            reason,
            rollback_checkpoint_id,
        } = event.payload
        {
            cancelled = Some((task_id, reason, rollback_checkpoint_id));
        }
    }
    let (task_id, reason, rollback_checkpoint_id) = cancelled.expect("cancel event");
    assert_eq!(task_id, task.id);
    assert_eq!(reason, "shutdown");
    assert_eq!(rollback_checkpoint_id, Some(checkpoint.id));
}
