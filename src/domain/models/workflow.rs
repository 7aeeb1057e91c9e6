//! Workflow domain model.
//!
//! A workflow groups tasks logically and carries parallelism and
//! error-handling policy. Tasks reference their workflow, not vice versa,
//! to avoid cyclic ownership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How ready tasks within a workflow are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStrategy {
    /// Fill available slots by priority order
    Parallel,
    /// One task at a time regardless of slots
    Sequential,
}

impl Default for ParallelStrategy {
    fn default() -> Self {
        Self::Parallel
    }
}

/// Parallelism policy for a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parallelism {
    /// Maximum concurrently active tasks, at least 1
    pub max_concurrent: usize,
    #[serde(default)]
    pub strategy: ParallelStrategy,
}

impl Default for Parallelism {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            strategy: ParallelStrategy::default(),
        }
    }
}

/// Error-handling policy, interpreted by the external task runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategy {
    ContinueOnError,
    Abort,
    Retry,
}

impl Default for ErrorStrategy {
    fn default() -> Self {
        Self::Abort
    }
}

impl ErrorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContinueOnError => "continue-on-error",
            Self::Abort => "abort",
            Self::Retry => "retry",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "continue-on-error" | "continue_on_error" => Some(Self::ContinueOnError),
            "abort" => Some(Self::Abort),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Error-handling policy flags for a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub strategy: ErrorStrategy,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::default(),
            max_retries: 0,
        }
    }
}

/// Logical grouping of tasks with scheduling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Detailed description
    pub description: String,
    /// Parallelism policy
    pub parallelism: Parallelism,
    /// Error-handling policy (external runner's contract)
    pub error_handling: ErrorHandling,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn from_spec(spec: WorkflowSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            description: spec.description,
            parallelism: spec.parallelism,
            error_handling: spec.error_handling,
            created_at: Utc::now(),
        }
    }
}

/// Specification for creating a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parallelism: Parallelism,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.parallelism.max_concurrent = max_concurrent;
        self
    }

    /// One task at a time regardless of `max_concurrent`.
    pub fn sequential(mut self) -> Self {
        self.parallelism.strategy = ParallelStrategy::Sequential;
        self
    }

    pub fn with_error_handling(mut self, strategy: ErrorStrategy, max_retries: u32) -> Self {
        self.error_handling = ErrorHandling {
            strategy,
            max_retries,
        };
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Workflow name cannot be empty".to_string());
        }
        if self.parallelism.max_concurrent < 1 {
            return Err("Workflow max_concurrent must be at least 1".to_string());
        }
        Ok(())
    }
}
