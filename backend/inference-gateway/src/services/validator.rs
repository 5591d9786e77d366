use crate::error::ValidationError;
use crate::models::{RawBatchRequest, RawRecommendationRequest, RecommendationRequest};
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_RESULT_LIMIT: usize = 10;
pub const MAX_RESULT_LIMIT: usize = 100;
pub const MAX_BATCH_SIZE: usize = 100;

/// Validated batch: subjects are checked one by one later so a bad id fails only its entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub subject_ids: Vec<String>,
    pub result_limit: usize,
}

/// Normalizes raw request parameters
#[derive(Debug, Clone)]
pub struct RequestValidator {
    default_limit: usize,
    max_limit: usize,
    max_batch_size: usize,
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_LIMIT, MAX_RESULT_LIMIT, MAX_BATCH_SIZE)
    }
}

impl RequestValidator {
    pub fn new(default_limit: usize, max_limit: usize, max_batch_size: usize) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            default_limit: default_limit.clamp(1, max_limit),
            max_limit,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn validate(
        &self,
        raw: RawRecommendationRequest,
    ) -> Result<RecommendationRequest, ValidationError> {
        let subject_id = self.validate_subject(raw.subject_id.as_deref())?;
        let result_limit = self.validate_limit(raw.result_limit)?;

        let exclusions: HashSet<String> = raw
            .exclusions
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        Ok(RecommendationRequest {
            subject_id,
            result_limit,
            exclusions,
            context: raw.context.unwrap_or_default(),
        })
    }

    /// Trimmed, non-empty subject identifier.
    pub fn validate_subject(&self, subject_id: Option<&str>) -> Result<String, ValidationError> {
        subject_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(ValidationError::MissingSubject)
    }

    /// Absent means default; oversized requests are clamped rather than rejected.
    pub fn validate_limit(&self, limit: Option<i64>) -> Result<usize, ValidationError> {
        match limit {
            None => Ok(self.default_limit),
            Some(n) if n <= 0 => Err(ValidationError::InvalidLimit(n)),
            Some(n) => {
                let requested = usize::try_from(n).unwrap_or(usize::MAX);
                if requested > self.max_limit {
                    debug!(
                        requested,
                        max = self.max_limit,
                        "Clamping result_limit to ceiling"
                    );
                }
                Ok(requested.min(self.max_limit))
            }
        }
    }

    pub fn validate_batch(&self, raw: RawBatchRequest) -> Result<BatchPlan, ValidationError> {
        let subject_ids = raw.subject_ids.unwrap_or_default();

        if subject_ids.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if subject_ids.len() > self.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: subject_ids.len(),
                max: self.max_batch_size,
            });
        }

        Ok(BatchPlan {
            subject_ids,
            result_limit: self.validate_limit(raw.result_limit)?,
        })
    }
}
