//! Task domain model.
//!
//! Tasks are discrete units of work that agents execute.
//! They form a DAG with typed dependencies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the coordination pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but not yet handed to an agent
    Pending,
    /// Task has been assigned to an agent
    Assigned,
    /// Task is currently being executed
    InProgress,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// Task was cancelled
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the referenced task has started execution (left `Pending`).
    pub fn has_started(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Valid transitions from this status.
    ///
    /// Cancelled is reachable from `Pending`, `Assigned`, or `InProgress`
    /// only; terminal states have no outgoing transitions.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Assigned, Self::Cancelled],
            Self::Assigned => vec![Self::InProgress, Self::Cancelled],
            Self::InProgress => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// How a dependency gates its dependent.
///
/// `FinishToStart` and `StartToStart` gate scheduling; `FinishToFinish`
/// and `StartToFinish` gate the dependent's completion instead and never
/// block its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Dependency must complete before this task starts
    FinishToStart,
    /// Dependency must have started before this task starts
    StartToStart,
    /// Dependency must complete before this task completes
    FinishToFinish,
    /// Dependency must have started before this task completes
    StartToFinish,
}

impl Default for DependencyKind {
    fn default() -> Self {
        Self::FinishToStart
    }
}

impl DependencyKind {
    /// Whether this kind gates the dependent's scheduling (vs completion).
    pub fn gates_start(&self) -> bool {
        matches!(self, Self::FinishToStart | Self::StartToStart)
    }
}

/// A typed edge to another task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    /// The task depended upon
    pub task_id: Uuid,
    /// How the dependency gates this task
    #[serde(default)]
    pub kind: DependencyKind,
}

impl TaskDependency {
    pub fn new(task_id: Uuid, kind: DependencyKind) -> Self {
        Self { task_id, kind }
    }

    /// Finish-to-start shorthand, the common case.
    pub fn finish_to_start(task_id: Uuid) -> Self {
        Self::new(task_id, DependencyKind::FinishToStart)
    }
}

/// What to do when a task is cancelled with rollback requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    /// No rollback
    None,
    /// Roll back to the most recent checkpoint
    PreviousCheckpoint,
    /// Restart from the beginning
    Restart,
}

impl Default for RollbackStrategy {
    fn default() -> Self {
        Self::None
    }
}

/// Named, timestamped snapshot of task state enabling rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier
    pub id: Uuid,
    /// When the checkpoint was taken
    pub timestamp: DateTime<Utc>,
    /// Human-readable description
    pub description: String,
    /// Opaque state snapshot, applied by the external executor
    pub state: serde_json::Value,
    /// Artifact references captured with the snapshot
    pub artifacts: Vec<String>,
}

impl Checkpoint {
    pub fn new(description: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            description: description.into(),
            state,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// A discrete unit of work that can be executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Type tag (e.g. "research", "implementation")
    pub task_type: String,
    /// Detailed description/prompt
    pub description: String,
    /// Priority, 0-100 (higher schedules first)
    pub priority: u8,
    /// Free-form tags for filtering
    pub tags: BTreeSet<String>,
    /// Advisory execution timeout in milliseconds; enforcement belongs to
    /// the external executor, not this core
    pub timeout_ms: Option<u64>,
    /// Typed dependency edges
    pub dependencies: Vec<TaskDependency>,
    /// Workflow this task belongs to, if any
    pub workflow_id: Option<Uuid>,
    /// Current status
    pub status: TaskStatus,
    /// Recorded checkpoints; the last one is the rollback target
    pub checkpoints: Vec<Checkpoint>,
    /// Rollback policy on cancellation
    pub rollback_strategy: RollbackStrategy,
    /// Retry count (data for the external executor, never acted on here)
    pub retry_count: u32,
    /// Maximum retries (data for the external executor)
    pub max_retries: u32,
    /// Agent currently holding this task
    pub assigned_agent_id: Option<Uuid>,
    /// Cancellation reason, when cancelled
    pub cancellation_reason: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from a validated spec.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: spec.task_type,
            description: spec.description,
            priority: spec.priority,
            tags: spec.tags,
            timeout_ms: spec.timeout_ms,
            dependencies: spec.dependencies,
            workflow_id: spec.workflow_id,
            status: TaskStatus::default(),
            checkpoints: Vec::new(),
            rollback_strategy: spec.rollback_strategy,
            retry_count: 0,
            max_retries: spec.max_retries,
            assigned_agent_id: None,
            cancellation_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        Ok(())
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The most recent checkpoint, i.e. the rollback target.
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }
}

/// Specification for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default)]
    pub rollback_strategy: RollbackStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_priority() -> u8 {
    50
}

const fn default_max_retries() -> u32 {
    3
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            priority: default_priority(),
            max_retries: default_max_retries(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_dependency(mut self, dep: TaskDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_rollback_strategy(mut self, strategy: RollbackStrategy) -> Self {
        self.rollback_strategy = strategy;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate fields that do not need table access.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("Task description cannot be empty".to_string());
        }
        if self.priority > 100 {
            return Err(format!(
                "Task priority {} out of range (0-100)",
                self.priority
            ));
        }
        Ok(())
    }
}

/// Filter for task listing. Fields are ANDed; `tags` matches if the task's
/// tag set intersects the filter's (any-match semantics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub priority_min: Option<u8>,
    pub priority_max: Option<u8>,
    pub workflow_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TaskFilter {
    /// Whether a task passes every set field of this filter.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(ref task_type) = self.task_type {
            if &task.task_type != task_type {
                return false;
            }
        }
        if let Some(ref tags) = self.tags {
            if !tags.is_empty() && task.tags.intersection(tags).next().is_none() {
                return false;
            }
        }
        if let Some(min) = self.priority_min {
            if task.priority < min {
                return false;
            }
        }
        if let Some(max) = self.priority_max {
            if task.priority > max {
                return false;
            }
        }
        if let Some(workflow_id) = self.workflow_id {
            if task.workflow_id != Some(workflow_id) {
                return false;
            }
        }
        true
    }
}
