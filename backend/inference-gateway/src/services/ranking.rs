/// Ranking Engine
///
/// Turns a scorer's raw candidate stream into the final ranked list:
/// 1. Take the current model snapshot (fail with `ModelUnavailable` if none)
/// 2. Score the subject under the inference deadline
/// 3. Drop excluded, duplicate and non-finite candidates
/// 4. Order by score descending, item id ascending on ties
/// 5. Truncate to the requested limit
/// 6. Attach reason code and catalog metadata
use crate::error::InferenceError;
use crate::metrics;
use crate::models::{RankedItem, ReasonCode, RequestContext};
use crate::services::catalog::Catalog;
use crate::services::model_handle::{LoadedModel, ModelHandle};
use crate::services::scorer::{ScoredCandidates, ScorerError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_millis(500);

/// Candidates drained between deadline checks during selection
const DEADLINE_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    UserToItem,
    ItemToItem,
}

impl RankingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::UserToItem => "user_to_item",
            RankingMode::ItemToItem => "item_to_item",
        }
    }
}

/// Engine output, tagged with the model version that produced it.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub items: Vec<RankedItem>,
    pub model_version: String,
}

pub struct RankingEngine {
    model: Arc<ModelHandle>,
    /// Takes precedence over the catalog shipped with the model
    catalog: Option<Arc<dyn Catalog>>,
    inference_timeout: Duration,
    catalog_timeout: Duration,
}

impl RankingEngine {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self {
            model,
            catalog: None,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            catalog_timeout: DEFAULT_CATALOG_TIMEOUT,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_timeouts(mut self, inference: Duration, catalog: Duration) -> Self {
        self.inference_timeout = inference;
        self.catalog_timeout = catalog;
        self
    }

    /// User-to-item ranking.
    pub async fn rank(
        &self,
        subject_id: &str,
        result_limit: usize,
        exclusions: &HashSet<String>,
        context: &RequestContext,
    ) -> Result<Ranking, InferenceError> {
        self.run(
            RankingMode::UserToItem,
            subject_id,
            result_limit,
            exclusions,
            context,
        )
        .await
    }

    /// Item-to-item ranking. The query item never appears in its own results.
    pub async fn similar(
        &self,
        item_id: &str,
        result_limit: usize,
        exclusions: &HashSet<String>,
    ) -> Result<Ranking, InferenceError> {
        self.run(
            RankingMode::ItemToItem,
            item_id,
            result_limit,
            exclusions,
            &RequestContext::new(),
        )
        .await
    }

    async fn run(
        &self,
        mode: RankingMode,
        subject_id: &str,
        result_limit: usize,
        exclusions: &HashSet<String>,
        context: &RequestContext,
    ) -> Result<Ranking, InferenceError> {
        let start = Instant::now();
        let result = self
            .run_inner(mode, subject_id, result_limit, exclusions, context)
            .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(InferenceError::ModelUnavailable) => "model_unavailable",
            Err(InferenceError::UnknownItem(_)) => "unknown_item",
            Err(InferenceError::BackendFailure(_)) => "backend_failure",
            Err(InferenceError::Timeout { .. }) => "timeout",
        };
        metrics::observe_inference(mode.as_str(), outcome, start.elapsed());

        result
    }

    async fn run_inner(
        &self,
        mode: RankingMode,
        subject_id: &str,
        result_limit: usize,
        exclusions: &HashSet<String>,
        context: &RequestContext,
    ) -> Result<Ranking, InferenceError> {
        let model = self
            .model
            .snapshot()
            .ok_or(InferenceError::ModelUnavailable)?;

        let mut excluded = exclusions.clone();
        if mode == RankingMode::ItemToItem {
            excluded.insert(subject_id.to_string());
        }

        let deadline = Instant::now() + self.inference_timeout;
        let selection = async {
            let scored = match mode {
                RankingMode::UserToItem => model.scorer.score(subject_id, context).await,
                RankingMode::ItemToItem => model.scorer.similar(subject_id).await,
            }
            .map_err(|e| scorer_failure(mode, subject_id, e))?;

            let ScoredCandidates { reason, candidates } = scored;

            // Candidate streams may be long and CPU-bound to drain. The blocking task
            // watches the same deadline so it stops once the request has timed out.
            let top = tokio::task::spawn_blocking(move || {
                select_top_until(candidates, &excluded, result_limit, Some(deadline))
            })
            .await
            .map_err(|e| {
                error!(subject_id = %subject_id, error = %e, "Candidate selection task failed");
                InferenceError::BackendFailure(e.to_string())
            })?
            .ok_or(InferenceError::Timeout {
                stage: "scoring",
                elapsed: self.inference_timeout,
            })?;

            Ok::<_, InferenceError>((reason, top))
        };

        let (reason, top) = match timeout(self.inference_timeout, selection).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    subject_id = %subject_id,
                    mode = mode.as_str(),
                    timeout_ms = self.inference_timeout.as_millis() as u64,
                    "Scoring timed out"
                );
                return Err(InferenceError::Timeout {
                    stage: "scoring",
                    elapsed: self.inference_timeout,
                });
            }
        };

        let items = self.attach_metadata(&model, subject_id, reason, top).await?;

        debug!(
            subject_id = %subject_id,
            mode = mode.as_str(),
            model_version = %model.version,
            count = items.len(),
            top_score = items.first().map(|item| item.score),
            "Ranking complete"
        );

        Ok(Ranking {
            items,
            model_version: model.version.clone(),
        })
    }

    async fn attach_metadata(
        &self,
        model: &LoadedModel,
        subject_id: &str,
        reason: ReasonCode,
        top: Vec<(String, f32)>,
    ) -> Result<Vec<RankedItem>, InferenceError> {
        let catalog = self.catalog.as_ref().or(model.catalog.as_ref());

        let mut metadata = match catalog {
            Some(catalog) if !top.is_empty() => {
                let ids: Vec<String> = top.iter().map(|(id, _)| id.clone()).collect();
                match timeout(self.catalog_timeout, catalog.lookup(&ids)).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        error!(
                            subject_id = %subject_id,
                            error = %e,
                            "Catalog lookup failed"
                        );
                        return Err(InferenceError::BackendFailure(e.to_string()));
                    }
                    Err(_) => {
                        warn!(
                            subject_id = %subject_id,
                            timeout_ms = self.catalog_timeout.as_millis() as u64,
                            "Catalog lookup timed out"
                        );
                        return Err(InferenceError::Timeout {
                            stage: "catalog lookup",
                            elapsed: self.catalog_timeout,
                        });
                    }
                }
            }
            _ => HashMap::new(),
        };

        Ok(top
            .into_iter()
            .map(|(item_id, score)| RankedItem {
                metadata: metadata.remove(&item_id).unwrap_or_default(),
                item_id,
                score,
                reason_code: reason,
            })
            .collect())
    }
}

fn scorer_failure(mode: RankingMode, subject_id: &str, err: ScorerError) -> InferenceError {
    match err {
        ScorerError::UnknownItem(id) => {
            debug!(subject_id = %subject_id, "Unknown item requested");
            InferenceError::UnknownItem(id)
        }
        ScorerError::Backend(cause) => {
            error!(
                subject_id = %subject_id,
                mode = mode.as_str(),
                error = %cause,
                "Scoring backend failed"
            );
            InferenceError::BackendFailure(cause)
        }
    }
}

/// Filter, deduplicate, order and truncate a raw candidate stream.
///
/// Duplicate ids keep their highest score. Non-finite scores are dropped.
pub fn select_top<I>(
    candidates: I,
    exclusions: &HashSet<String>,
    limit: usize,
) -> Vec<(String, f32)>
where
    I: IntoIterator<Item = (String, f32)>,
{
    select_top_until(candidates, exclusions, limit, None).unwrap_or_default()
}

/// [`select_top`] that abandons the stream once `deadline` passes, returning `None`.
fn select_top_until<I>(
    candidates: I,
    exclusions: &HashSet<String>,
    limit: usize,
    deadline: Option<Instant>,
) -> Option<Vec<(String, f32)>>
where
    I: IntoIterator<Item = (String, f32)>,
{
    if limit == 0 {
        return Some(Vec::new());
    }

    let mut best: HashMap<String, f32> = HashMap::new();
    for (seen, (item_id, score)) in candidates.into_iter().enumerate() {
        if let Some(deadline) = deadline {
            if seen % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                return None;
            }
        }
        if !score.is_finite() || exclusions.contains(&item_id) {
            continue;
        }
        best.entry(item_id)
            .and_modify(|existing| {
                if score > *existing {
                    *existing = score;
                }
            })
            .or_insert(score);
    }

    let mut ranked: Vec<(String, f32)> = best.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    Some(ranked)
}
