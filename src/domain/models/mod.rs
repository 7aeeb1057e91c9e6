//! Domain models.

pub mod agent;
pub mod config;
pub mod decision;
pub mod task;
pub mod workflow;

pub use agent::{Agent, AgentStatus, Capability};
pub use config::{ConsensusConfig, LoggingConfig, MaintenanceConfig, SwarmConfig};
pub use decision::{
    Decision, DecisionOption, DecisionOutcome, DecisionType, EmergencyKind, Vote, VotingAlgorithm,
};
pub use task::{
    Checkpoint, DependencyKind, RollbackStrategy, Task, TaskDependency, TaskFilter, TaskSpec,
    TaskStatus,
};
pub use workflow::{
    ErrorHandling, ErrorStrategy, Parallelism, ParallelStrategy, Workflow, WorkflowSpec,
};
