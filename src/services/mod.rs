pub mod agent_pool;
pub mod agent_registry;
pub mod consensus;
pub mod dependency_graph;
pub mod event_bus;
pub mod task_graph;

pub use agent_pool::{AgentPoolCoordinator, SwarmMetrics, SwarmStatus};
pub use agent_registry::AgentRegistry;
pub use consensus::{ConsensusEngine, MaintenanceHandle};
pub use event_bus::{EventBus, EventId, EventPayload, SequenceNumber, SwarmEvent};
pub use task_graph::{CancelOutcome, DependencySnapshot, TaskGraphEngine, TaskView};
