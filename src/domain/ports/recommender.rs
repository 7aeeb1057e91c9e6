//! Optional recommender hook consulted when a decision is initiated.
//!
//! Invoked best-effort: any failure is logged and swallowed, never
//! propagated to the caller.

use async_trait::async_trait;

use crate::domain::models::Decision;

/// A recommendation produced by an external scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// The recommended option id
    pub option_id: String,
    pub reasoning: String,
    /// Recommender's confidence in [0,1]
    pub confidence: f64,
}

/// External recommendation source (e.g. a learned pattern model).
#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, decision: &Decision) -> anyhow::Result<Recommendation>;
}
