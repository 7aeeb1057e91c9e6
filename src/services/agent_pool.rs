//! Agent pool coordinator.
//!
//! Wraps the agent registry with lifecycle gating and task-assignment
//! operations. Every state transition is announced on the event bus; the
//! coordinator never blocks on observers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, AgentStatus, Capability, TaskStatus};
use crate::services::agent_registry::AgentRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::task_graph::TaskGraphEngine;

/// Aggregate counts of agents and tasks by state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwarmStatus {
    pub agents_by_status: HashMap<AgentStatus, usize>,
    pub tasks_by_status: HashMap<TaskStatus, usize>,
}

/// Monotonic coordination counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmMetrics {
    pub agents_registered: u64,
    pub tasks_created: u64,
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
}

pub struct AgentPoolCoordinator {
    registry: Arc<AgentRegistry>,
    tasks: Arc<TaskGraphEngine>,
    bus: EventBus,
    running: AtomicBool,
    agents_registered: AtomicU64,
    tasks_assigned: AtomicU64,
}

impl AgentPoolCoordinator {
    pub fn new(tasks: Arc<TaskGraphEngine>, bus: EventBus) -> Self {
        Self::with_registry(Arc::new(AgentRegistry::new()), tasks, bus)
    }

    /// Build around a shared registry (the consensus engine reads the same
    /// table for participation and expertise weighting).
    pub fn with_registry(
        registry: Arc<AgentRegistry>,
        tasks: Arc<TaskGraphEngine>,
        bus: EventBus,
    ) -> Self {
        Self {
            registry,
            tasks,
            bus,
            running: AtomicBool::new(false),
            agents_registered: AtomicU64::new(0),
            tasks_assigned: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        Arc::clone(&self.registry)
    }

    /// Start accepting mutating calls.
    pub async fn initialize(&self) -> SwarmResult<()> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("agent pool coordinator initialized");
        Ok(())
    }

    /// Stop accepting mutating calls.
    pub async fn shutdown(&self) -> SwarmResult<()> {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("agent pool coordinator shut down");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> SwarmResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(SwarmError::NotInitialized)
        }
    }

    /// Register a new idle agent with default reputation; returns its id.
    pub async fn register_agent(
        &self,
        name: impl Into<String>,
        agent_type: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> SwarmResult<Uuid> {
        self.ensure_running()?;
        let agent = self.registry.insert(name, agent_type, capabilities).await;
        self.agents_registered.fetch_add(1, Ordering::Relaxed);
        tracing::info!(agent_id = %agent.id, agent_type = %agent.agent_type, "agent registered");
        self.bus.emit(EventPayload::AgentRegistered {
            agent_id: agent.id,
            agent_type: agent.agent_type.clone(),
        });
        Ok(agent.id)
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> SwarmResult<Agent> {
        self.registry.get(agent_id).await
    }

    /// Assign a ready pending task to an idle agent.
    ///
    /// The task transition happens first; the agent is only marked busy
    /// once the task side has committed, so a task-side failure leaves the
    /// agent untouched.
    pub async fn assign_task(&self, task_id: Uuid, agent_id: Uuid) -> SwarmResult<()> {
        self.ensure_running()?;

        let agent = self.registry.get(agent_id).await?;
        if agent.status != AgentStatus::Idle {
            return Err(SwarmError::AgentUnavailable {
                agent_id,
                status: agent.status.to_string(),
            });
        }

        self.tasks.mark_assigned(task_id, agent_id).await?;

        let previous = self.registry.set_status(agent_id, AgentStatus::Busy).await?;
        self.registry
            .set_current_task(agent_id, Some(task_id))
            .await?;
        self.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        self.bus.emit(EventPayload::AgentStatusChanged {
            agent_id,
            from: previous,
            to: AgentStatus::Busy,
        });
        tracing::info!(task_id = %task_id, agent_id = %agent_id, "task assigned");
        Ok(())
    }

    /// Move an assigned task to in-progress.
    pub async fn start_task(&self, task_id: Uuid) -> SwarmResult<()> {
        self.ensure_running()?;
        self.tasks.mark_in_progress(task_id).await?;
        Ok(())
    }

    /// Finish a task, free its agent, and apply reputation feedback.
    pub async fn complete_task(&self, task_id: Uuid, success: bool) -> SwarmResult<()> {
        self.ensure_running()?;
        let task = self.tasks.finish_task(task_id, success).await?;

        if let Some(agent_id) = task.assigned_agent_id {
            let previous = self.registry.set_status(agent_id, AgentStatus::Idle).await?;
            self.registry.set_current_task(agent_id, None).await?;
            let reputation = self.registry.record_outcome(agent_id, success).await?;
            self.bus.emit(EventPayload::AgentStatusChanged {
                agent_id,
                from: previous,
                to: AgentStatus::Idle,
            });
            tracing::debug!(agent_id = %agent_id, reputation, "reputation updated");
        }
        Ok(())
    }

    /// Aggregate counts of agents and tasks by state.
    pub async fn get_swarm_status(&self) -> SwarmStatus {
        SwarmStatus {
            agents_by_status: self.registry.counts_by_status().await,
            tasks_by_status: self.tasks.counts_by_status().await,
        }
    }

    /// Monotonic counter snapshot.
    pub fn get_metrics(&self) -> SwarmMetrics {
        let task_counters = self.tasks.counters();
        SwarmMetrics {
            agents_registered: self.agents_registered.load(Ordering::Relaxed),
            tasks_created: task_counters.tasks_created,
            tasks_assigned: self.tasks_assigned.load(Ordering::Relaxed),
            tasks_completed: task_counters.tasks_completed,
            tasks_failed: task_counters.tasks_failed,
            tasks_cancelled: task_counters.tasks_cancelled,
        }
    }

    pub async fn get_agent_reputation(&self, agent_id: Uuid) -> SwarmResult<f64> {
        Ok(self.registry.get(agent_id).await?.reputation)
    }
}
