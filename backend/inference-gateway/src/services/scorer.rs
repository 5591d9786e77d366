/// Scoring Backend Interface
///
/// Any model backend plugs into the gateway by implementing [`Scorer`]. The ranking
/// engine only sees this trait, never a concrete model library.
use crate::models::{ReasonCode, RequestContext};
use async_trait::async_trait;
use thiserror::Error;

/// Lazy stream of `(item_id, score)` pairs. Order is not significant.
pub type CandidateStream = Box<dyn Iterator<Item = (String, f32)> + Send>;

/// Candidates produced by one scorer call, tagged with why they were produced.
pub struct ScoredCandidates {
    pub reason: ReasonCode,
    pub candidates: CandidateStream,
}

impl ScoredCandidates {
    pub fn new(reason: ReasonCode, candidates: CandidateStream) -> Self {
        Self { reason, candidates }
    }

    pub fn empty(reason: ReasonCode) -> Self {
        Self {
            reason,
            candidates: Box::new(std::iter::empty()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("{0}")]
    Backend(String),
}

/// Model capability consumed by the ranking engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    /// User-to-item candidates for `subject_id`.
    async fn score(
        &self,
        subject_id: &str,
        context: &RequestContext,
    ) -> Result<ScoredCandidates, ScorerError>;

    /// Item-to-item candidates similar to `item_id`.
    async fn similar(&self, item_id: &str) -> Result<ScoredCandidates, ScorerError>;
}
