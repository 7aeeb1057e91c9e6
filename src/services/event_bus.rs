//! EventBus service for swarm event distribution.
//!
//! Broadcast-based with sequence numbering. Emission never blocks on
//! observers: a send with no subscribers, or to a lagging subscriber,
//! is tolerated and the engine moves on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{AgentStatus, DecisionOutcome, DecisionType, EmergencyKind};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event envelope with bus-assigned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// All events the swarm core emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Task lifecycle events
    TaskCreated {
        task_id: Uuid,
        task_type: String,
        priority: u8,
    },
    TaskAssigned {
        task_id: Uuid,
        agent_id: Uuid,
    },
    TaskStarted {
        task_id: Uuid,
    },
    TaskCompleted {
        task_id: Uuid,
        agent_id: Option<Uuid>,
    },
    TaskFailed {
        task_id: Uuid,
        agent_id: Option<Uuid>,
    },
    TaskCancelled {
        task_id: Uuid,
        reason: String,
        rollback_checkpoint_id: Option<Uuid>,
    },
    CheckpointAdded {
        task_id: Uuid,
        checkpoint_id: Uuid,
    },
    WorkflowCreated {
        workflow_id: Uuid,
        name: String,
    },

    // Agent events
    AgentRegistered {
        agent_id: Uuid,
        agent_type: String,
    },
    AgentStatusChanged {
        agent_id: Uuid,
        from: AgentStatus,
        to: AgentStatus,
    },
    AgentSpawnRequested {
        agent_type: String,
        replacing: Option<Uuid>,
    },

    // Consensus events
    ConsensusInitiated {
        decision_id: Uuid,
        decision_type: DecisionType,
        option_count: usize,
    },
    DecisionResolved {
        decision_id: Uuid,
        outcome: DecisionOutcome,
        selected_option_id: Option<String>,
        consensus_level: f64,
    },
    EmergencyTriggered {
        kind: EmergencyKind,
    },
    RecoveryIntent {
        kind: EmergencyKind,
    },

    // Periodic maintenance events
    SwarmMetrics {
        active_agents: usize,
        mean_reputation: f64,
        active_decisions: usize,
        resolved_decisions: usize,
        mean_consensus_level: f64,
    },
    PatternPrediction {
        agent_type: String,
        status: AgentStatus,
        cluster_fraction: f64,
    },
}

impl EventPayload {
    /// Topic string for external routing, `category:action` style.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task:created",
            Self::TaskAssigned { .. } => "task:assigned",
            Self::TaskStarted { .. } => "task:started",
            Self::TaskCompleted { .. } => "task:completed",
            Self::TaskFailed { .. } => "task:failed",
            Self::TaskCancelled { .. } => "task:cancelled",
            Self::CheckpointAdded { .. } => "task:checkpoint",
            Self::WorkflowCreated { .. } => "workflow:created",
            Self::AgentRegistered { .. } => "agent:registered",
            Self::AgentStatusChanged { .. } => "agent:status_change",
            Self::AgentSpawnRequested { .. } => "agent:spawn_requested",
            Self::ConsensusInitiated { .. } => "consensus:initiated",
            Self::DecisionResolved { .. } => "consensus:resolved",
            Self::EmergencyTriggered { .. } => "emergency:triggered",
            Self::RecoveryIntent { .. } => "emergency:recovery_intent",
            Self::SwarmMetrics { .. } => "swarm:metrics",
            Self::PatternPrediction { .. } => "pattern:prediction",
        }
    }
}

/// Broadcast event bus shared by the engines.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwarmEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event. Never blocks; events with no subscribers are dropped.
    pub fn emit(&self, payload: EventPayload) -> SequenceNumber {
        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        let event = SwarmEvent {
            id: EventId::new(),
            sequence,
            timestamp: Utc::now(),
            payload,
        };
        tracing::debug!(topic = event.payload.topic(), sequence = %sequence, "event emitted");
        // A send error only means no live subscribers.
        let _ = self.sender.send(event);
        sequence
    }

    /// Subscribe to the full event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
