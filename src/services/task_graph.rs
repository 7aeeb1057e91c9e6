//! Task graph engine: task/workflow lifecycle, dependency readiness,
//! checkpoints, and cancellation with rollback intent.
//!
//! All mutation goes through this engine; the task table and workflow
//! table are each guarded by their own lock so every operation is an
//! atomic read-modify-write. Rollback here means recording intent and
//! surfacing the checkpoint; state restoration belongs to the external
//! executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::{
    Checkpoint, DependencyKind, ParallelStrategy, RollbackStrategy, Task, TaskDependency,
    TaskFilter, TaskSpec, TaskStatus, Workflow, WorkflowSpec,
};
use crate::services::dependency_graph;
use crate::services::event_bus::{EventBus, EventPayload};

/// Resolved snapshot of one dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySnapshot {
    pub task_id: Uuid,
    pub kind: DependencyKind,
    pub status: TaskStatus,
}

/// A task plus the current status of everything it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub task: Task,
    pub dependencies: Vec<DependencySnapshot>,
}

/// Result of a cancellation. When rollback was requested and the task's
/// strategy is `PreviousCheckpoint`, the last checkpoint is surfaced for
/// the external executor to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub task: Task,
    pub rollback_checkpoint: Option<Checkpoint>,
}

/// Monotonic task counters maintained by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub tasks_created: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
}

/// Owns tasks and workflows; notifies observers via the event bus.
pub struct TaskGraphEngine {
    tasks: RwLock<HashMap<Uuid, Task>>,
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    bus: EventBus,
    tasks_created: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_cancelled: AtomicU64,
}

impl TaskGraphEngine {
    pub fn new(bus: EventBus) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            workflows: RwLock::new(HashMap::new()),
            bus,
            tasks_created: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
        }
    }

    /// Create a task from a spec.
    ///
    /// Validates the priority range, resolves every dependency id against
    /// the existing table, and rejects dependency cycles before anything
    /// is stored: a failed create leaves no partial mutation.
    pub async fn create_task(&self, spec: TaskSpec) -> SwarmResult<Task> {
        spec.validate().map_err(SwarmError::Validation)?;

        let mut tasks = self.tasks.write().await;

        for dep in &spec.dependencies {
            if !tasks.contains_key(&dep.task_id) {
                return Err(SwarmError::TaskNotFound(dep.task_id));
            }
        }
        if let Some(workflow_id) = spec.workflow_id {
            if !self.workflows.read().await.contains_key(&workflow_id) {
                return Err(SwarmError::WorkflowNotFound(workflow_id));
            }
        }

        let task = Task::from_spec(spec);
        Self::check_acyclic(&tasks, task.id, &task.dependencies)?;

        tracing::info!(task_id = %task.id, task_type = %task.task_type, "task created");
        self.bus.emit(EventPayload::TaskCreated {
            task_id: task.id,
            task_type: task.task_type.clone(),
            priority: task.priority,
        });
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Add a dependency edge to an existing pending task.
    pub async fn add_dependency(&self, task_id: Uuid, dep: TaskDependency) -> SwarmResult<Task> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&dep.task_id) {
            return Err(SwarmError::TaskNotFound(dep.task_id));
        }
        let current = tasks
            .get(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        if current.status != TaskStatus::Pending {
            return Err(SwarmError::InvalidStateTransition {
                from: current.status.as_str().to_string(),
                to: current.status.as_str().to_string(),
                reason: "dependencies can only be added to pending tasks".to_string(),
            });
        }

        let mut edges: Vec<TaskDependency> = current.dependencies.clone();
        edges.push(dep);
        Self::check_acyclic(&tasks, task_id, &edges)?;

        let task = tasks.get_mut(&task_id).ok_or(SwarmError::TaskNotFound(task_id))?;
        task.dependencies.push(dep);
        Ok(task.clone())
    }

    /// Reject graphs where the candidate edges would close a cycle.
    fn check_acyclic(
        tasks: &HashMap<Uuid, Task>,
        candidate_id: Uuid,
        candidate_deps: &[TaskDependency],
    ) -> SwarmResult<()> {
        let mut edges: HashMap<Uuid, Vec<Uuid>> = tasks
            .values()
            .map(|t| (t.id, t.dependencies.iter().map(|d| d.task_id).collect()))
            .collect();
        edges.insert(
            candidate_id,
            candidate_deps.iter().map(|d| d.task_id).collect(),
        );

        match dependency_graph::find_cycle(&edges) {
            Some(cycle) => Err(SwarmError::DependencyCycle(cycle)),
            None => Ok(()),
        }
    }

    /// A task plus resolved dependency snapshots.
    pub async fn get_task_status(&self, id: Uuid) -> SwarmResult<TaskView> {
        let tasks = self.tasks.read().await;
        let task = tasks.get(&id).ok_or(SwarmError::TaskNotFound(id))?;
        let dependencies = task
            .dependencies
            .iter()
            .filter_map(|dep| {
                tasks.get(&dep.task_id).map(|t| DependencySnapshot {
                    task_id: dep.task_id,
                    kind: dep.kind,
                    status: t.status,
                })
            })
            .collect();
        Ok(TaskView {
            task: task.clone(),
            dependencies,
        })
    }

    /// List tasks matching a filter.
    ///
    /// Filter fields are ANDed. The sequence is stable: created_at
    /// ascending, task id as the final tie-break, with offset/limit
    /// pagination applied after sorting.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let offset = filter.offset.unwrap_or(0);
        let matched: Vec<Task> = matched.into_iter().skip(offset).collect();
        match filter.limit {
            Some(limit) => matched.into_iter().take(limit).collect(),
            None => matched,
        }
    }

    /// Cancel a task. Cooperative, not preemptive: an in-progress task's
    /// executor must observe the status and stop voluntarily.
    pub async fn cancel_task(
        &self,
        id: Uuid,
        reason: impl Into<String>,
        rollback: bool,
    ) -> SwarmResult<CancelOutcome> {
        let reason = reason.into();
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(SwarmError::TaskNotFound(id))?;

        if !task.can_transition_to(TaskStatus::Cancelled) {
            return Err(SwarmError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Cancelled.as_str().to_string(),
                reason: "cancel is only allowed from pending, assigned, or in_progress"
                    .to_string(),
            });
        }
        task.status = TaskStatus::Cancelled;
        task.cancellation_reason = Some(reason.clone());

        let rollback_checkpoint = if rollback
            && task.rollback_strategy == RollbackStrategy::PreviousCheckpoint
        {
            task.last_checkpoint().cloned()
        } else {
            None
        };

        tracing::info!(task_id = %id, reason = %reason, "task cancelled");
        self.bus.emit(EventPayload::TaskCancelled {
            task_id: id,
            reason,
            rollback_checkpoint_id: rollback_checkpoint.as_ref().map(|c| c.id),
        });
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);

        Ok(CancelOutcome {
            task: task.clone(),
            rollback_checkpoint,
        })
    }

    /// Create a workflow; the stored record round-trips the spec's values.
    pub async fn create_workflow(&self, spec: WorkflowSpec) -> SwarmResult<Workflow> {
        spec.validate().map_err(SwarmError::Validation)?;
        let workflow = Workflow::from_spec(spec);
        self.bus.emit(EventPayload::WorkflowCreated {
            workflow_id: workflow.id,
            name: workflow.name.clone(),
        });
        self.workflows
            .write()
            .await
            .insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: Uuid) -> SwarmResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SwarmError::WorkflowNotFound(id))
    }

    /// Append a checkpoint; it becomes the new rollback target.
    pub async fn add_checkpoint(
        &self,
        task_id: Uuid,
        checkpoint: Checkpoint,
    ) -> SwarmResult<Checkpoint> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        self.bus.emit(EventPayload::CheckpointAdded {
            task_id,
            checkpoint_id: checkpoint.id,
        });
        task.checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Whether a task's scheduling gates are satisfied: every
    /// finish-to-start dependency completed, every start-to-start
    /// dependency out of pending. Finish-to-finish and start-to-finish
    /// edges gate completion and never block the start.
    fn is_ready(task: &Task, tasks: &HashMap<Uuid, Task>) -> bool {
        task.dependencies.iter().all(|dep| {
            let Some(dep_task) = tasks.get(&dep.task_id) else {
                return false;
            };
            match dep.kind {
                DependencyKind::FinishToStart => dep_task.status == TaskStatus::Completed,
                DependencyKind::StartToStart => dep_task.status.has_started(),
                DependencyKind::FinishToFinish | DependencyKind::StartToFinish => true,
            }
        })
    }

    /// Whether a task's completion gates are satisfied: every
    /// finish-to-finish dependency completed, every start-to-finish
    /// dependency out of pending.
    fn completion_gates_met(task: &Task, tasks: &HashMap<Uuid, Task>) -> bool {
        task.dependencies.iter().all(|dep| {
            let Some(dep_task) = tasks.get(&dep.task_id) else {
                return false;
            };
            match dep.kind {
                DependencyKind::FinishToFinish => dep_task.status == TaskStatus::Completed,
                DependencyKind::StartToFinish => dep_task.status.has_started(),
                DependencyKind::FinishToStart | DependencyKind::StartToStart => true,
            }
        })
    }

    /// Pending tasks that are ready to be assigned, selected by priority
    /// descending with creation time ascending as the tie-break (pure
    /// FIFO), filling up to each workflow's free `max_concurrent` slots.
    /// Tasks outside any workflow are not slot-capped.
    pub async fn schedulable_tasks(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let workflows = self.workflows.read().await;

        // Active = already occupying a slot.
        let mut active_per_workflow: HashMap<Uuid, usize> = HashMap::new();
        for task in tasks.values() {
            if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                if let Some(wf) = task.workflow_id {
                    *active_per_workflow.entry(wf).or_insert(0) += 1;
                }
            }
        }

        let mut ready: Vec<&Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && Self::is_ready(t, &tasks))
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut slots_used = active_per_workflow;
        let mut selected = Vec::new();
        for task in ready {
            match task.workflow_id {
                Some(wf_id) => {
                    let cap = workflows.get(&wf_id).map_or(usize::MAX, |wf| {
                        match wf.parallelism.strategy {
                            ParallelStrategy::Sequential => 1,
                            ParallelStrategy::Parallel => wf.parallelism.max_concurrent,
                        }
                    });
                    let used = slots_used.entry(wf_id).or_insert(0);
                    if *used < cap {
                        *used += 1;
                        selected.push(task.clone());
                    }
                }
                None => selected.push(task.clone()),
            }
        }
        selected
    }

    /// Whether the task may currently transition to `Completed`.
    pub async fn can_complete(&self, id: Uuid) -> SwarmResult<bool> {
        let tasks = self.tasks.read().await;
        let task = tasks.get(&id).ok_or(SwarmError::TaskNotFound(id))?;
        Ok(Self::completion_gates_met(task, &tasks))
    }

    /// Assign a ready pending task to an agent. Agent-side checks are the
    /// coordinator's responsibility.
    pub async fn mark_assigned(&self, task_id: Uuid, agent_id: Uuid) -> SwarmResult<Task> {
        let mut tasks = self.tasks.write().await;
        let snapshot = tasks
            .get(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        if snapshot.status != TaskStatus::Pending || !Self::is_ready(snapshot, &tasks) {
            return Err(SwarmError::InvalidStateTransition {
                from: snapshot.status.as_str().to_string(),
                to: TaskStatus::Assigned.as_str().to_string(),
                reason: "task must be pending with scheduling gates satisfied".to_string(),
            });
        }
        let task = tasks
            .get_mut(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        task.status = TaskStatus::Assigned;
        task.assigned_agent_id = Some(agent_id);
        self.bus.emit(EventPayload::TaskAssigned { task_id, agent_id });
        Ok(task.clone())
    }

    /// Transition an assigned task to in-progress.
    pub async fn mark_in_progress(&self, task_id: Uuid) -> SwarmResult<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        task.transition_to(TaskStatus::InProgress)
            .map_err(|reason| SwarmError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::InProgress.as_str().to_string(),
                reason,
            })?;
        self.bus.emit(EventPayload::TaskStarted { task_id });
        Ok(task.clone())
    }

    /// Finish an in-progress task as completed or failed. Successful
    /// completion additionally requires the finish-to-finish and
    /// start-to-finish gates to be satisfied.
    pub async fn finish_task(&self, task_id: Uuid, success: bool) -> SwarmResult<Task> {
        let mut tasks = self.tasks.write().await;
        let snapshot = tasks
            .get(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;

        let target = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if success && !Self::completion_gates_met(snapshot, &tasks) {
            return Err(SwarmError::InvalidStateTransition {
                from: snapshot.status.as_str().to_string(),
                to: target.as_str().to_string(),
                reason: "completion gates (finish-to-finish / start-to-finish) not satisfied"
                    .to_string(),
            });
        }

        let task = tasks
            .get_mut(&task_id)
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        task.transition_to(target)
            .map_err(|reason| SwarmError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: target.as_str().to_string(),
                reason,
            })?;

        let agent_id = task.assigned_agent_id;
        if success {
            self.tasks_completed.fetch_add(1, Ordering::Relaxed);
            self.bus
                .emit(EventPayload::TaskCompleted { task_id, agent_id });
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
            self.bus.emit(EventPayload::TaskFailed { task_id, agent_id });
        }
        Ok(task.clone())
    }

    /// Redistribute the work of a failed agent: cancel its live tasks and
    /// re-enqueue fresh pending clones with an incremented retry count.
    /// Cloning keeps every recorded transition legal under the task state
    /// machine.
    pub async fn redistribute_agent_tasks(&self, agent_id: Uuid) -> Vec<(Uuid, Uuid)> {
        let mut tasks = self.tasks.write().await;
        let orphaned: Vec<Uuid> = tasks
            .values()
            .filter(|t| {
                t.assigned_agent_id == Some(agent_id)
                    && matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress)
            })
            .map(|t| t.id)
            .collect();

        let mut replacements = Vec::new();
        for old_id in orphaned {
            let Some(old) = tasks.get_mut(&old_id) else {
                continue;
            };
            old.status = TaskStatus::Cancelled;
            old.cancellation_reason = Some("agent failure".to_string());
            self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
            self.bus.emit(EventPayload::TaskCancelled {
                task_id: old_id,
                reason: "agent failure".to_string(),
                rollback_checkpoint_id: None,
            });

            let mut clone = Task::from_spec(TaskSpec {
                task_type: old.task_type.clone(),
                description: old.description.clone(),
                priority: old.priority,
                tags: old.tags.clone(),
                timeout_ms: old.timeout_ms,
                dependencies: old.dependencies.clone(),
                workflow_id: old.workflow_id,
                rollback_strategy: old.rollback_strategy,
                max_retries: old.max_retries,
            });
            clone.retry_count = old.retry_count + 1;
            clone.checkpoints = old.checkpoints.clone();
            let new_id = clone.id;
            self.tasks_created.fetch_add(1, Ordering::Relaxed);
            self.bus.emit(EventPayload::TaskCreated {
                task_id: new_id,
                task_type: clone.task_type.clone(),
                priority: clone.priority,
            });
            tasks.insert(new_id, clone);
            replacements.push((old_id, new_id));
        }

        if !replacements.is_empty() {
            tracing::warn!(
                agent_id = %agent_id,
                count = replacements.len(),
                "redistributed tasks from failed agent"
            );
        }
        replacements
    }

    /// Aggregate task counts by status.
    pub async fn counts_by_status(&self) -> HashMap<TaskStatus, usize> {
        let tasks = self.tasks.read().await;
        let mut counts = HashMap::new();
        for task in tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Monotonic counter snapshot.
    pub fn counters(&self) -> TaskCounters {
        TaskCounters {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
        }
    }
}
