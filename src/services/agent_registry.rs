//! In-memory agent registry.
//!
//! The leaf table of agents, their capabilities, reputation, and status.
//! Reputation is mutated only via task-outcome feedback.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, AgentStatus, Capability};

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<Uuid, Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly built agent and return it.
    pub async fn insert(
        &self,
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Agent {
        let agent = Agent::new(name, agent_type, capabilities);
        self.agents.write().await.insert(agent.id, agent.clone());
        agent
    }

    pub async fn get(&self, id: Uuid) -> SwarmResult<Agent> {
        self.agents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SwarmError::AgentNotFound(id))
    }

    pub async fn list(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        agents
    }

    /// Set an agent's status, returning the previous one.
    pub async fn set_status(&self, id: Uuid, status: AgentStatus) -> SwarmResult<AgentStatus> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or(SwarmError::AgentNotFound(id))?;
        let previous = agent.status;
        agent.status = status;
        Ok(previous)
    }

    /// Record which task an agent currently holds.
    pub async fn set_current_task(&self, id: Uuid, task_id: Option<Uuid>) -> SwarmResult<()> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or(SwarmError::AgentNotFound(id))?;
        agent.current_task_id = task_id;
        Ok(())
    }

    /// Apply task-outcome feedback and return the updated reputation.
    pub async fn record_outcome(&self, id: Uuid, success: bool) -> SwarmResult<f64> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or(SwarmError::AgentNotFound(id))?;
        agent.record_outcome(success);
        Ok(agent.reputation)
    }

    /// Count of agents eligible to participate in consensus (not offline).
    pub async fn active_count(&self) -> usize {
        self.agents
            .read()
            .await
            .values()
            .filter(|a| a.status.is_active())
            .count()
    }

    /// Mean capability proficiency for one agent; 0.0 for unknown agents.
    pub async fn expertise(&self, id: Uuid) -> f64 {
        self.agents
            .read()
            .await
            .get(&id)
            .map_or(0.0, Agent::expertise)
    }

    /// Aggregate agent counts by status.
    pub async fn counts_by_status(&self) -> HashMap<AgentStatus, usize> {
        let agents = self.agents.read().await;
        let mut counts = HashMap::new();
        for agent in agents.values() {
            *counts.entry(agent.status).or_insert(0) += 1;
        }
        counts
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = AgentRegistry::new();
        let agent = registry
            .insert("worker", "coder", vec![Capability::new("rust")])
            .await;
        let fetched = registry.get(agent.id).await.unwrap();
        assert_eq!(fetched.name, "worker");
        assert_eq!(fetched.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_get_unknown_agent() {
        let registry = AgentRegistry::new();
        let err = registry.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_active_count_excludes_offline() {
        let registry = AgentRegistry::new();
        let a = registry.insert("a", "coder", vec![]).await;
        registry.insert("b", "coder", vec![]).await;
        assert_eq!(registry.active_count().await, 2);

        registry.set_status(a.id, AgentStatus::Offline).await.unwrap();
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_record_outcome_updates_reputation() {
        let registry = AgentRegistry::new();
        let agent = registry.insert("a", "coder", vec![]).await;
        let rep = registry.record_outcome(agent.id, true).await.unwrap();
        assert!((rep - 0.55).abs() < 1e-9);
    }
}
