//! Consensus decision domain model.
//!
//! A `Decision` collects `Vote`s from participating agents until a
//! quorum-weighted threshold is met or its deadline elapses. Option
//! tallies are derived state, recomputed purely from the current vote
//! set on every change.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::SwarmError;

/// What kind of choice a decision resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    TaskAssignment,
    ResourceAllocation,
    StrategyChange,
    AgentSpawn,
    ConsensusVote,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskAssignment => "task_assignment",
            Self::ResourceAllocation => "resource_allocation",
            Self::StrategyChange => "strategy_change",
            Self::AgentSpawn => "agent_spawn",
            Self::ConsensusVote => "consensus_vote",
        }
    }
}

/// Terminal outcome of a decision. Timeout is a normal `Failure` record,
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Pending,
    Success,
    Failure,
}

impl Default for DecisionOutcome {
    fn default() -> Self {
        Self::Pending
    }
}

/// One of the competing options under a decision.
///
/// `votes`, `supporters`, and `confidence` are derived from the live vote
/// set and hold no independent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOption {
    /// Caller-chosen identifier, unique within the decision
    pub id: String,
    pub description: String,
    pub expected_outcome: String,
    /// Relative risk in [0,1]
    pub risk_level: f64,
    /// Relative resource cost
    pub resource_cost: f64,
    /// Estimated execution time in milliseconds
    pub time_estimate_ms: u64,
    /// Derived: count of live votes for this option
    #[serde(default)]
    pub votes: usize,
    /// Derived: agents currently voting for this option
    #[serde(default)]
    pub supporters: BTreeSet<Uuid>,
    /// Derived: mean confidence of supporting votes
    #[serde(default)]
    pub confidence: f64,
}

impl DecisionOption {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_outcome: String::new(),
            risk_level: 0.0,
            resource_cost: 0.0,
            time_estimate_ms: 0,
            votes: 0,
            supporters: BTreeSet::new(),
            confidence: 0.0,
        }
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    pub fn with_risk_level(mut self, risk: f64) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_resource_cost(mut self, cost: f64) -> Self {
        self.resource_cost = cost;
        self
    }

    pub fn with_time_estimate_ms(mut self, ms: u64) -> Self {
        self.time_estimate_ms = ms;
        self
    }

    fn reset_tally(&mut self) {
        self.votes = 0;
        self.supporters.clear();
        self.confidence = 0.0;
    }
}

/// A single agent's vote on a decision. At most one live vote per
/// `(agent_id, decision_id)`; a newer vote replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: Uuid,
    pub decision_id: Uuid,
    pub option_id: String,
    /// Voting weight, e.g. seniority or stake
    pub weight: f64,
    /// Voter's confidence in the option, in [0,1]
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    pub fn new(agent_id: Uuid, decision_id: Uuid, option_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            decision_id,
            option_id: option_id.into(),
            weight: 1.0,
            confidence: 1.0,
            reasoning: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

/// A collective decision resolved by the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub decision_type: DecisionType,
    pub description: String,
    pub options: Vec<DecisionOption>,
    pub selected_option_id: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    /// `participation_rate * consensus_rate` for the leading option
    pub consensus_level: f64,
    /// Agents that have voted
    pub participants: BTreeSet<Uuid>,
    pub outcome: DecisionOutcome,
    pub timestamp: DateTime<Utc>,
    /// Hard resolution deadline
    pub deadline: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        decision_type: DecisionType,
        description: impl Into<String>,
        options: Vec<DecisionOption>,
        deadline: DateTime<Utc>,
    ) -> Self {
        let mut options = options;
        for option in &mut options {
            option.reset_tally();
        }
        Self {
            id: Uuid::new_v4(),
            decision_type,
            description: description.into(),
            options,
            selected_option_id: None,
            confidence: 0.0,
            reasoning: String::new(),
            consensus_level: 0.0,
            participants: BTreeSet::new(),
            outcome: DecisionOutcome::Pending,
            timestamp: Utc::now(),
            deadline,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome != DecisionOutcome::Pending
    }

    pub fn option(&self, option_id: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Recompute every option's tally and this decision's consensus level
    /// purely from the given live vote set.
    ///
    /// `active_agents` is the count of non-offline agents at the moment of
    /// the check; zero active agents yields zero participation.
    pub fn recompute_tallies(&mut self, votes: &[Vote], active_agents: usize) {
        for option in &mut self.options {
            option.reset_tally();
        }
        self.participants.clear();

        for vote in votes {
            self.participants.insert(vote.agent_id);
            if let Some(option) = self.options.iter_mut().find(|o| o.id == vote.option_id) {
                option.votes += 1;
                option.supporters.insert(vote.agent_id);
                option.confidence += vote.confidence;
            }
        }
        for option in &mut self.options {
            if option.votes > 0 {
                option.confidence /= option.votes as f64;
            }
        }

        self.consensus_level = if votes.is_empty() || active_agents == 0 {
            0.0
        } else {
            let participation = votes.len() as f64 / active_agents as f64;
            let leading = self.options.iter().map(|o| o.votes).max().unwrap_or(0);
            let consensus = leading as f64 / votes.len() as f64;
            participation * consensus
        };
    }
}

/// Pluggable winner-selection algorithm, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingAlgorithm {
    /// Option with the most raw votes wins
    Majority,
    /// Option with the highest sum of weight * confidence wins
    Weighted,
    /// Option with the highest sum of supporter expertise wins
    Expertise,
    /// Fallback alias for `Weighted`; no learned scorer is wired in
    Neural,
}

impl Default for VotingAlgorithm {
    fn default() -> Self {
        Self::Majority
    }
}

impl VotingAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Majority => "majority",
            Self::Weighted => "weighted",
            Self::Expertise => "expertise",
            Self::Neural => "neural",
        }
    }
}

impl std::str::FromStr for VotingAlgorithm {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "majority" => Ok(Self::Majority),
            "weighted" => Ok(Self::Weighted),
            "expertise" => Ok(Self::Expertise),
            "neural" => Ok(Self::Neural),
            other => Err(SwarmError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Emergency recovery protocols, handled best-effort by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmergencyKind {
    /// An agent stopped responding; redistribute its work and request a
    /// replacement spawn
    AgentFailure { agent_id: Uuid },
    /// No pending decision can reach threshold; force executive resolution
    ConsensusDeadlock,
    /// Resources exhausted; external handlers shed load
    ResourceExhaustion,
    /// The swarm has partitioned; external handlers re-form it
    SwarmFragmentation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn decision_with_options(ids: &[&str]) -> Decision {
        let options = ids.iter().map(|id| DecisionOption::new(*id, *id)).collect();
        Decision::new(
            DecisionType::TaskAssignment,
            "pick",
            options,
            Utc::now() + Duration::seconds(30),
        )
    }

    #[test]
    fn test_new_decision_zeroes_tallies() {
        let mut option = DecisionOption::new("a", "option a");
        option.votes = 7;
        option.confidence = 0.9;
        let decision = Decision::new(
            DecisionType::StrategyChange,
            "test",
            vec![option],
            Utc::now() + Duration::seconds(1),
        );
        assert_eq!(decision.options[0].votes, 0);
        assert!(decision.options[0].supporters.is_empty());
        assert_eq!(decision.outcome, DecisionOutcome::Pending);
    }

    #[test]
    fn test_recompute_tallies() {
        let mut decision = decision_with_options(&["a", "b"]);
        let v1 = Uuid::new_v4();
        let v2 = Uuid::new_v4();
        let v3 = Uuid::new_v4();
        let votes = vec![
            Vote::new(v1, decision.id, "a").with_confidence(0.8),
            Vote::new(v2, decision.id, "a").with_confidence(0.6),
            Vote::new(v3, decision.id, "b").with_confidence(1.0),
        ];

        decision.recompute_tallies(&votes, 4);

        let a = decision.option("a").unwrap();
        assert_eq!(a.votes, 2);
        assert_eq!(a.supporters.len(), 2);
        assert!((a.confidence - 0.7).abs() < 1e-9);

        // participation 3/4, consensus 2/3
        assert!((decision.consensus_level - 0.5).abs() < 1e-9);
        assert_eq!(decision.participants.len(), 3);
    }

    #[test]
    fn test_consensus_level_no_votes_or_agents() {
        let mut decision = decision_with_options(&["a"]);
        decision.recompute_tallies(&[], 5);
        assert!((decision.consensus_level - 0.0).abs() < f64::EPSILON);

        let votes = vec![Vote::new(Uuid::new_v4(), decision.id, "a")];
        decision.recompute_tallies(&votes, 0);
        assert!((decision.consensus_level - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(
            "majority".parse::<VotingAlgorithm>().unwrap(),
            VotingAlgorithm::Majority
        );
        assert_eq!(
            "WEIGHTED".parse::<VotingAlgorithm>().unwrap(),
            VotingAlgorithm::Weighted
        );
        assert_eq!(
            "neural".parse::<VotingAlgorithm>().unwrap(),
            VotingAlgorithm::Neural
        );
        assert!(matches!(
            "quantum".parse::<VotingAlgorithm>(),
            Err(SwarmError::UnknownAlgorithm(_))
        ));
    }
}
