//! Integration tests for the agent pool coordinator working against the
//! task graph: scheduling, assignment, and reputation feedback.

use std::sync::Arc;

use hivecore::services::{AgentPoolCoordinator, EventBus, EventPayload, TaskGraphEngine};
use hivecore::{AgentStatus, Capability, SwarmError, TaskSpec, TaskStatus, WorkflowSpec};

fn fixture() -> (Arc<TaskGraphEngine>, AgentPoolCoordinator, EventBus) {
    let bus = EventBus::new(128);
    let tasks = Arc::new(TaskGraphEngine::new(bus.clone()));
    let pool = AgentPoolCoordinator::new(Arc::clone(&tasks), bus.clone());
    (tasks, pool, bus)
}

#[tokio::test]
async fn test_scheduling_pipeline_respects_priority() {
    let (tasks, pool, _bus) = fixture();
    pool.initialize().await.unwrap();

    let agent = pool
        .register_agent("worker", "coder", vec![Capability::new("rust")])
        .await
        .unwrap();
    tasks
        .create_task(TaskSpec::new("t", "low").with_priority(10))
        .await
        .unwrap();
    let urgent = tasks
        .create_task(TaskSpec::new("t", "urgent").with_priority(95))
        .await
        .unwrap();

    // The scheduler offers the urgent task first; assign it via the pool.
    let next = tasks.schedulable_tasks().await;
    assert_eq!(next[0].id, urgent.id);
    pool.assign_task(next[0].id, agent).await.unwrap();

    let view = tasks.get_task_status(urgent.id).await.unwrap();
    assert_eq!(view.task.status, TaskStatus::Assigned);
    assert_eq!(view.task.assigned_agent_id, Some(agent));
}

#[tokio::test]
async fn test_failed_task_lowers_reputation() {
    let (tasks, pool, _bus) = fixture();
    pool.initialize().await.unwrap();

    let agent = pool.register_agent("worker", "coder", vec![]).await.unwrap();
    let task = tasks.create_task(TaskSpec::new("t", "doomed")).await.unwrap();

    pool.assign_task(task.id, agent).await.unwrap();
    pool.start_task(task.id).await.unwrap();
    pool.complete_task(task.id, false).await.unwrap();

    // 0.9 * 0.5 + 0.1 * 0.0
    let rep = pool.get_agent_reputation(agent).await.unwrap();
    assert!((rep - 0.45).abs() < 1e-9);

    // The agent is free again despite the failure.
    let fetched = pool.get_agent(agent).await.unwrap();
    assert_eq!(fetched.status, AgentStatus::Idle);
    assert!(fetched.current_task_id.is_none());

    let metrics = pool.get_metrics();
    assert_eq!(metrics.tasks_failed, 1);
    assert_eq!(metrics.tasks_completed, 0);
}

#[tokio::test]
async fn test_repeated_outcomes_converge_reputation() {
    let (tasks, pool, _bus) = fixture();
    pool.initialize().await.unwrap();
    let agent = pool.register_agent("worker", "coder", vec![]).await.unwrap();

    for i in 0..20 {
        let task = tasks
            .create_task(TaskSpec::new("t", format!("round {i}")))
            .await
            .unwrap();
        pool.assign_task(task.id, agent).await.unwrap();
        pool.start_task(task.id).await.unwrap();
        pool.complete_task(task.id, true).await.unwrap();
    }

    // Sustained success pushes reputation toward 1.0 without exceeding it.
    let rep = pool.get_agent_reputation(agent).await.unwrap();
    assert!(rep > 0.9);
    assert!(rep <= 1.0);
}

#[tokio::test]
async fn test_workflow_batch_through_pool() {
    let (tasks, pool, _bus) = fixture();
    pool.initialize().await.unwrap();

    let wf = tasks
        .create_workflow(WorkflowSpec::new("batch").with_max_concurrent(2))
        .await
        .unwrap();
    for i in 0..3 {
        tasks
            .create_task(TaskSpec::new("t", format!("member {i}")).with_workflow(wf.id))
            .await
            .unwrap();
    }
    let agents = [
        pool.register_agent("a", "coder", vec![]).await.unwrap(),
        pool.register_agent("b", "coder", vec![]).await.unwrap(),
    ];

    let batch = tasks.schedulable_tasks().await;
    assert_eq!(batch.len(), 2);
    for (task, agent) in batch.iter().zip(agents) {
        pool.assign_task(task.id, agent).await.unwrap();
    }

    // Both workflow slots occupied; the third member waits.
    assert!(tasks.schedulable_tasks().await.is_empty());
    let status = pool.get_swarm_status().await;
    assert_eq!(status.tasks_by_status[&TaskStatus::Assigned], 2);
    assert_eq!(status.tasks_by_status[&TaskStatus::Pending], 1);
}

#[tokio::test]
async fn test_shutdown_rejects_mutations_but_not_reads() {
    let (tasks, pool, _bus) = fixture();
    pool.initialize().await.unwrap();
    let agent = pool.register_agent("worker", "coder", vec![]).await.unwrap();
    let task = tasks.create_task(TaskSpec::new("t", "late")).await.unwrap();

    pool.shutdown().await.unwrap();

    let err = pool.assign_task(task.id, agent).await.unwrap_err();
    assert!(matches!(err, SwarmError::NotInitialized));

    // Reads still work while shut down.
    assert!(pool.get_agent(agent).await.is_ok());
    let status = pool.get_swarm_status().await;
    assert_eq!(status.agents_by_status[&AgentStatus::Idle], 1);
}

#[tokio::test]
async fn test_agent_events_on_assignment_cycle() {
    let (tasks, pool, bus) = fixture();
    let mut rx = bus.subscribe();
    pool.initialize().await.unwrap();

    let agent = pool.register_agent("worker", "coder", vec![]).await.unwrap();
    let task = tasks.create_task(TaskSpec::new("t", "traced")).await.unwrap();
    pool.assign_task(task.id, agent).await.unwrap();
    pool.start_task(task.id).await.unwrap();
    pool.complete_task(task.id, true).await.unwrap();

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EventPayload::AgentStatusChanged { from, to, .. } = event.payload {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (AgentStatus::Idle, AgentStatus::Busy),
            (AgentStatus::Busy, AgentStatus::Idle),
        ]
    );
}
