//! Consensus decision engine.
//!
//! Resolves a `Decision` by collecting votes from participating agents and
//! applying a pluggable voting algorithm, with bounded wait time and
//! graceful degradation. A decision resolves `Success` when
//! `participation * agreement` reaches the configured threshold, or
//! `Failure` when the deadline elapses; timeout is a normal terminal
//! record, never an error. Once resolved, a decision is immutable and
//! moves from the active set into history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::{SwarmError, SwarmResult};
use crate::domain::models::{
    AgentStatus, ConsensusConfig, Decision, DecisionOption, DecisionOutcome, DecisionType,
    EmergencyKind, MaintenanceConfig, Vote, VotingAlgorithm,
};
use crate::domain::ports::Recommender;
use crate::services::agent_registry::AgentRegistry;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::task_graph::TaskGraphEngine;

/// Reduced confidence assigned by executive deadlock resolution.
const EXECUTIVE_CONFIDENCE: f64 = 0.6;

pub struct ConsensusEngine {
    config: ConsensusConfig,
    maintenance: MaintenanceConfig,
    registry: Arc<AgentRegistry>,
    tasks: Arc<TaskGraphEngine>,
    bus: EventBus,
    recommender: Option<Arc<dyn Recommender>>,
    active: RwLock<HashMap<Uuid, Decision>>,
    votes: RwLock<HashMap<Uuid, HashMap<Uuid, Vote>>>,
    history: RwLock<Vec<Decision>>,
    cache: RwLock<HashMap<(DecisionType, String), Decision>>,
    vote_notify: Notify,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        maintenance: MaintenanceConfig,
        registry: Arc<AgentRegistry>,
        tasks: Arc<TaskGraphEngine>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            maintenance,
            registry,
            tasks,
            bus,
            recommender: None,
            active: RwLock::new(HashMap::new()),
            votes: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
            vote_notify: Notify::new(),
        }
    }

    /// Attach an external recommendation hook, consulted best-effort when a
    /// decision is initiated.
    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = Some(recommender);
        self
    }

    /// Raise a decision and wait until it resolves.
    ///
    /// If caching is enabled and an identical `(type, description)` key was
    /// previously resolved successfully, the cached record is returned
    /// immediately; differing `options` are ignored on a cache hit.
    /// Otherwise the call blocks until the consensus threshold is met or
    /// `max_decision_time` elapses, whichever comes first. The wait is a
    /// vote-arrival notification raced against the poll interval and the
    /// hard deadline, so the observable semantics are check-or-timeout.
    pub async fn make_decision(
        &self,
        decision_type: DecisionType,
        description: impl Into<String>,
        options: Vec<DecisionOption>,
    ) -> SwarmResult<Decision> {
        let description = description.into();
        if options.is_empty() {
            return Err(SwarmError::Validation(
                "decision requires at least one option".to_string(),
            ));
        }

        if self.config.cache_enabled {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&(decision_type, description.clone())) {
                tracing::debug!(decision_type = decision_type.as_str(), "decision cache hit");
                return Ok(cached.clone());
            }
        }

        let deadline = Utc::now()
            + ChronoDuration::milliseconds(
                i64::try_from(self.config.max_decision_time_ms).unwrap_or(i64::MAX),
            );
        let decision = Decision::new(decision_type, description, options, deadline);
        let decision_id = decision.id;

        self.bus.emit(EventPayload::ConsensusInitiated {
            decision_id,
            decision_type,
            option_count: decision.options.len(),
        });
        tracing::info!(
            decision_id = %decision_id,
            decision_type = decision_type.as_str(),
            "consensus initiated"
        );

        self.consult_recommender(&decision).await;
        self.active.write().await.insert(decision_id, decision);

        let hard_deadline = tokio::time::Instant::now() + self.config.max_decision_time();
        loop {
            if let Some(resolved) = self.try_resolve(decision_id).await {
                return Ok(resolved);
            }
            let notified = self.vote_notify.notified();
            tokio::pin!(notified);
            let wake = tokio::time::timeout_at(hard_deadline, async {
                tokio::select! {
                    () = &mut notified => {}
                    () = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            })
            .await;

            if wake.is_err() {
                // Deadline hit; one final check before recording the timeout,
                // since a qualifying vote may have landed at the boundary.
                if let Some(resolved) = self.try_resolve(decision_id).await {
                    return Ok(resolved);
                }
                return Ok(self.resolve_timeout(decision_id).await);
            }
        }
    }

    /// Best-effort recommender call; failures are logged and swallowed.
    async fn consult_recommender(&self, decision: &Decision) {
        let Some(recommender) = &self.recommender else {
            return;
        };
        match recommender.recommend(decision).await {
            Ok(rec) => {
                tracing::info!(
                    decision_id = %decision.id,
                    option_id = %rec.option_id,
                    confidence = rec.confidence,
                    "recommender suggestion"
                );
            }
            Err(err) => {
                tracing::warn!(decision_id = %decision.id, error = %err, "recommender failed");
            }
        }
    }

    /// Upsert a vote. A new vote from the same agent replaces its prior
    /// vote; option tallies and the consensus level are recomputed purely
    /// from the resulting vote set.
    pub async fn submit_vote(&self, vote: Vote) -> SwarmResult<Decision> {
        let decision_id = vote.decision_id;
        {
            let active = self.active.read().await;
            let decision = active
                .get(&decision_id)
                .ok_or(SwarmError::DecisionNotFound(decision_id))?;
            if decision.option(&vote.option_id).is_none() {
                return Err(SwarmError::Validation(format!(
                    "unknown option '{}' for decision {decision_id}",
                    vote.option_id
                )));
            }
        }

        let snapshot: Vec<Vote> = {
            let mut votes = self.votes.write().await;
            let per_decision = votes.entry(decision_id).or_default();
            per_decision.insert(vote.agent_id, vote);
            per_decision.values().cloned().collect()
        };
        let active_agents = self.registry.active_count().await;

        let updated = {
            let mut active = self.active.write().await;
            let decision = active
                .get_mut(&decision_id)
                .ok_or(SwarmError::DecisionNotFound(decision_id))?;
            decision.recompute_tallies(&snapshot, active_agents);
            decision.clone()
        };

        self.vote_notify.notify_waiters();
        Ok(updated)
    }

    /// Check one active decision against the threshold; resolve it if met.
    /// Returns the terminal record if the decision is no longer pending.
    async fn try_resolve(&self, decision_id: Uuid) -> Option<Decision> {
        let snapshot: Vec<Vote> = self
            .votes
            .read()
            .await
            .get(&decision_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        let active_agents = self.registry.active_count().await;
        let expertise = self.expertise_of_voters(&snapshot).await;

        let mut active = self.active.write().await;
        let Some(decision) = active.get_mut(&decision_id) else {
            // Resolved externally (e.g. deadlock recovery) while we slept.
            drop(active);
            return self.find_in_history(decision_id).await;
        };

        decision.recompute_tallies(&snapshot, active_agents);
        if decision.consensus_level < self.config.threshold {
            return None;
        }

        let winner_id = select_winner(decision, &snapshot, self.config.algorithm, &expertise)?;
        let winner_confidence = decision
            .option(&winner_id)
            .map_or(0.0, |option| option.confidence);
        decision.selected_option_id = Some(winner_id.clone());
        decision.confidence = (winner_confidence + decision.consensus_level) / 2.0;
        decision.reasoning = format!(
            "selected by {} algorithm at consensus level {:.2}",
            self.config.algorithm.as_str(),
            decision.consensus_level
        );
        decision.outcome = DecisionOutcome::Success;

        let resolved = active.remove(&decision_id)?;
        drop(active);
        self.finalize(resolved.clone()).await;
        Some(resolved)
    }

    /// Record a deadline expiry as a terminal failure, not an error.
    async fn resolve_timeout(&self, decision_id: Uuid) -> Decision {
        let snapshot: Vec<Vote> = self
            .votes
            .read()
            .await
            .get(&decision_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        let active_agents = self.registry.active_count().await;

        let mut active = self.active.write().await;
        let Some(mut decision) = active.remove(&decision_id) else {
            drop(active);
            // Resolved externally (e.g. deadlock recovery); its record lands
            // in history momentarily.
            loop {
                if let Some(found) = self.find_in_history(decision_id).await {
                    return found;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        };
        drop(active);

        decision.recompute_tallies(&snapshot, active_agents);
        decision.outcome = DecisionOutcome::Failure;
        decision.reasoning = "Consensus timeout".to_string();
        tracing::warn!(decision_id = %decision_id, "consensus timeout");
        self.finalize(decision.clone()).await;
        decision
    }

    /// Move a terminal decision into history, cache successes, and emit.
    async fn finalize(&self, decision: Decision) {
        self.bus.emit(EventPayload::DecisionResolved {
            decision_id: decision.id,
            outcome: decision.outcome,
            selected_option_id: decision.selected_option_id.clone(),
            consensus_level: decision.consensus_level,
        });
        if decision.outcome == DecisionOutcome::Success && self.config.cache_enabled {
            self.cache.write().await.insert(
                (decision.decision_type, decision.description.clone()),
                decision.clone(),
            );
        }
        self.history.write().await.push(decision);
        self.vote_notify.notify_waiters();
    }

    async fn find_in_history(&self, decision_id: Uuid) -> Option<Decision> {
        self.history
            .read()
            .await
            .iter()
            .find(|d| d.id == decision_id)
            .cloned()
    }

    async fn expertise_of_voters(&self, votes: &[Vote]) -> HashMap<Uuid, f64> {
        let mut expertise = HashMap::new();
        for vote in votes {
            if !expertise.contains_key(&vote.agent_id) {
                expertise.insert(vote.agent_id, self.registry.expertise(vote.agent_id).await);
            }
        }
        expertise
    }

    /// Apply task-outcome feedback to an agent's reputation, feeding the
    /// expertise-weighted algorithm.
    pub async fn record_task_outcome(&self, agent_id: Uuid, success: bool) -> SwarmResult<f64> {
        self.registry.record_outcome(agent_id, success).await
    }

    pub async fn get_active_decisions(&self) -> Vec<Decision> {
        let mut decisions: Vec<Decision> = self.active.read().await.values().cloned().collect();
        decisions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        decisions
    }

    pub async fn get_decision_history(&self) -> Vec<Decision> {
        self.history.read().await.clone()
    }

    pub async fn get_agent_reputation(&self, agent_id: Uuid) -> SwarmResult<f64> {
        Ok(self.registry.get(agent_id).await?.reputation)
    }

    /// Handle an emergency protocol. Best-effort: internal failures are
    /// logged and swallowed, never surfaced to the caller.
    pub async fn handle_emergency(&self, kind: EmergencyKind) {
        self.bus
            .emit(EventPayload::EmergencyTriggered { kind: kind.clone() });
        match kind {
            EmergencyKind::AgentFailure { agent_id } => {
                self.recover_agent_failure(agent_id).await;
            }
            EmergencyKind::ConsensusDeadlock => {
                self.force_resolve_all().await;
            }
            EmergencyKind::ResourceExhaustion | EmergencyKind::SwarmFragmentation => {
                self.bus.emit(EventPayload::RecoveryIntent { kind });
            }
        }
    }

    /// Mark the agent offline, redistribute its live tasks, and request a
    /// replacement spawn.
    async fn recover_agent_failure(&self, agent_id: Uuid) {
        let agent_type = match self.registry.get(agent_id).await {
            Ok(agent) => agent.agent_type,
            Err(err) => {
                tracing::warn!(agent_id = %agent_id, error = %err, "failed agent unknown");
                return;
            }
        };
        if let Err(err) = self.registry.set_status(agent_id, AgentStatus::Offline).await {
            tracing::warn!(agent_id = %agent_id, error = %err, "could not mark agent offline");
        }
        self.tasks.redistribute_agent_tasks(agent_id).await;
        self.bus.emit(EventPayload::AgentSpawnRequested {
            agent_type,
            replacing: Some(agent_id),
        });
        // Offline agents shrink the participation denominator; pending
        // decisions may now resolve.
        self.vote_notify.notify_waiters();
    }

    /// Force-resolve every pending decision by selecting its first option
    /// with reduced confidence.
    async fn force_resolve_all(&self) {
        let drained: Vec<Decision> = {
            let mut active = self.active.write().await;
            active.drain().map(|(_, d)| d).collect()
        };
        let count = drained.len();
        for mut decision in drained {
            let snapshot: Vec<Vote> = self
                .votes
                .read()
                .await
                .get(&decision.id)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default();
            let active_agents = self.registry.active_count().await;
            decision.recompute_tallies(&snapshot, active_agents);

            decision.selected_option_id = decision.options.first().map(|o| o.id.clone());
            decision.confidence = EXECUTIVE_CONFIDENCE;
            decision.reasoning = "executive decision due to deadlock".to_string();
            decision.outcome = DecisionOutcome::Failure;
            self.finalize(decision).await;
        }
        if count > 0 {
            tracing::warn!(count, "deadlock recovery force-resolved pending decisions");
        }
    }

    /// Spawn the periodic maintenance loops. Every iteration swallows and
    /// logs internal failures; background loops must never crash.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        let metrics = {
            let engine = Arc::clone(self);
            let period = std::time::Duration::from_secs(engine.maintenance.metrics_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    engine.emit_collective_metrics().await;
                }
            })
        };
        let emergence = {
            let engine = Arc::clone(self);
            let period = std::time::Duration::from_secs(engine.maintenance.emergence_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    engine.detect_emergent_behavior().await;
                }
            })
        };
        let prune = {
            let engine = Arc::clone(self);
            let period = std::time::Duration::from_secs(engine.maintenance.prune_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    engine.prune_history().await;
                }
            })
        };
        MaintenanceHandle {
            handles: vec![metrics, emergence, prune],
        }
    }

    /// Recompute collective-intelligence metrics and publish them.
    pub(crate) async fn emit_collective_metrics(&self) {
        let agents = self.registry.list().await;
        let active_agents = agents.iter().filter(|a| a.status.is_active()).count();
        let mean_reputation = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.reputation).sum::<f64>() / agents.len() as f64
        };
        let history = self.history.read().await;
        let mean_consensus_level = if history.is_empty() {
            0.0
        } else {
            history.iter().map(|d| d.consensus_level).sum::<f64>() / history.len() as f64
        };
        self.bus.emit(EventPayload::SwarmMetrics {
            active_agents,
            mean_reputation,
            active_decisions: self.active.read().await.len(),
            resolved_decisions: history.len(),
            mean_consensus_level,
        });
    }

    /// Flag any (agent type, status) cluster exceeding the configured
    /// fraction of the population.
    pub(crate) async fn detect_emergent_behavior(&self) {
        let agents = self.registry.list().await;
        if agents.is_empty() {
            return;
        }
        let population = agents.len() as f64;
        let mut clusters: HashMap<(String, AgentStatus), usize> = HashMap::new();
        for agent in &agents {
            *clusters
                .entry((agent.agent_type.clone(), agent.status))
                .or_insert(0) += 1;
        }
        for ((agent_type, status), count) in clusters {
            let fraction = count as f64 / population;
            if fraction > self.maintenance.emergence_cluster_fraction {
                tracing::debug!(
                    agent_type = %agent_type,
                    status = %status,
                    fraction,
                    "emergent behavior cluster"
                );
                self.bus.emit(EventPayload::PatternPrediction {
                    agent_type,
                    status,
                    cluster_fraction: fraction,
                });
            }
        }
    }

    /// Drop resolved decisions and their votes past the retention window.
    pub(crate) async fn prune_history(&self) {
        let retention = i64::try_from(self.maintenance.history_retention_secs).unwrap_or(i64::MAX);
        let cutoff = Utc::now() - ChronoDuration::seconds(retention);
        let pruned_ids: Vec<Uuid> = {
            let mut history = self.history.write().await;
            let pruned: Vec<Uuid> = history
                .iter()
                .filter(|d| d.timestamp < cutoff)
                .map(|d| d.id)
                .collect();
            history.retain(|d| d.timestamp >= cutoff);
            pruned
        };
        if pruned_ids.is_empty() {
            return;
        }
        let mut votes = self.votes.write().await;
        for id in &pruned_ids {
            votes.remove(id);
        }
        tracing::debug!(count = pruned_ids.len(), "pruned decision history");
    }
}

/// Aborts the maintenance loops when dropped.
pub struct MaintenanceHandle {
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pick the winning option among those with at least one supporter.
/// Ties break deterministically by option order (first listed wins).
fn select_winner(
    decision: &Decision,
    votes: &[Vote],
    algorithm: VotingAlgorithm,
    expertise: &HashMap<Uuid, f64>,
) -> Option<String> {
    let score_for = |option: &DecisionOption| -> f64 {
        match algorithm {
            VotingAlgorithm::Majority => option.votes as f64,
            VotingAlgorithm::Weighted | VotingAlgorithm::Neural => votes
                .iter()
                .filter(|v| v.option_id == option.id)
                .map(|v| v.weight * v.confidence)
                .sum(),
            VotingAlgorithm::Expertise => option
                .supporters
                .iter()
                .map(|agent_id| expertise.get(agent_id).copied().unwrap_or(0.0))
                .sum(),
        }
    };

    let mut best: Option<(&DecisionOption, f64)> = None;
    for option in &decision.options {
        if option.votes == 0 {
            continue;
        }
        let score = score_for(option);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((option, score)),
        }
    }
    best.map(|(option, _)| option.id.clone())
}
