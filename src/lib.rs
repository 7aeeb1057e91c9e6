//! Hivecore - Swarm Coordination Core
//!
//! Hivecore is the engineering core of a CLI-driven swarm automation tool:
//! a dependency-aware task graph engine, an agent pool coordinator, and a
//! consensus decision engine with pluggable voting algorithms.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic and domain models
//! - **Service Layer** (`services`): Engine implementations and coordination
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//!
//! The CLI surface, durable persistence, process spawning, and learned
//! pattern models are external collaborators; this crate exposes an
//! in-process library boundary only.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hivecore::services::{AgentPoolCoordinator, EventBus, TaskGraphEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = EventBus::new(256);
//!     let tasks = Arc::new(TaskGraphEngine::new(bus.clone()));
//!     let pool = AgentPoolCoordinator::new(tasks, bus);
//!     pool.initialize().await?;
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{SwarmError, SwarmResult};
pub use domain::models::{
    Agent, AgentStatus, Capability, Checkpoint, ConsensusConfig, Decision, DecisionOption,
    DecisionOutcome, DecisionType, DependencyKind, EmergencyKind, LoggingConfig,
    MaintenanceConfig, RollbackStrategy, SwarmConfig, Task, TaskDependency, TaskFilter, TaskSpec,
    TaskStatus, Vote, VotingAlgorithm, Workflow, WorkflowSpec,
};
pub use domain::ports::{Recommendation, Recommender};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AgentPoolCoordinator, AgentRegistry, ConsensusEngine, EventBus, TaskGraphEngine,
};
