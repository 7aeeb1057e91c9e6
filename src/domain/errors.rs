//! Domain errors for the Hivecore swarm system.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur in the Hivecore system.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Decision not found: {0}")]
    DecisionNotFound(Uuid),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Agent {agent_id} unavailable: status is {status}")]
    AgentUnavailable { agent_id: Uuid, status: String },

    #[error("Unknown voting algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Coordinator not initialized")]
    NotInitialized,
}

pub type SwarmResult<T> = Result<T, SwarmError>;

impl From<serde_json::Error> for SwarmError {
    fn from(err: serde_json::Error) -> Self {
        SwarmError::Validation(err.to_string())
    }
}
