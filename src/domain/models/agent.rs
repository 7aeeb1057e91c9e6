//! Agent domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reputation EMA smoothing: new = 0.9 * old + 0.1 * signal.
const REPUTATION_DECAY: f64 = 0.9;

/// Agent status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Offline => write!(f, "offline"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for AgentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            "error" => Ok(Self::Error),
            _ => Err(anyhow::anyhow!("Invalid agent status: {s}")),
        }
    }
}

impl AgentStatus {
    /// Offline agents do not count toward consensus participation.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// A weighted capability an agent advertises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    /// Proficiency in [0,1]; 1.0 when unweighted
    #[serde(default = "default_proficiency")]
    pub proficiency: f64,
}

const fn default_proficiency() -> f64 {
    1.0
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proficiency: default_proficiency(),
        }
    }

    pub fn weighted(name: impl Into<String>, proficiency: f64) -> Self {
        Self {
            name: name.into(),
            proficiency: proficiency.clamp(0.0, 1.0),
        }
    }
}

/// Agent entity representing a worker in the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier
    pub id: Uuid,

    /// Human-readable name
    pub name: String,

    /// Role tag (e.g. "coordinator", "researcher", "coder")
    pub agent_type: String,

    /// Advertised capabilities, each optionally weighted
    pub capabilities: Vec<Capability>,

    /// Current agent status
    pub status: AgentStatus,

    /// Exponential moving average of task-success signal, in [0,1]
    pub reputation: f64,

    /// ID of the currently held task (if any)
    pub current_task_id: Option<Uuid>,

    /// Agent registration timestamp
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new idle agent with the default 0.5 reputation.
    pub fn new(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            agent_type: agent_type.into(),
            capabilities,
            status: AgentStatus::Idle,
            reputation: 0.5,
            current_task_id: None,
            registered_at: Utc::now(),
        }
    }

    /// Mean capability proficiency, the agent's expertise score.
    pub fn expertise(&self) -> f64 {
        if self.capabilities.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.capabilities.iter().map(|c| c.proficiency).sum();
        sum / self.capabilities.len() as f64
    }

    /// Apply task-outcome feedback to reputation.
    pub fn record_outcome(&mut self, success: bool) {
        let signal = if success { 1.0 } else { 0.0 };
        self.reputation =
            (REPUTATION_DECAY * self.reputation + (1.0 - REPUTATION_DECAY) * signal).clamp(0.0, 1.0);
    }
}
