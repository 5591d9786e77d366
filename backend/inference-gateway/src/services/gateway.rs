/// Gateway Service
///
/// Drives one request through the serving pipeline:
///
/// `Received -> Authenticated -> Validated -> ModelChecked -> Ranked -> Responded`
///
/// Authentication happens in the HTTP middleware before a handler runs. Every later
/// gate lives here and exits early with the matching [`GatewayError`].
use crate::error::{GatewayError, Result, ValidationError};
use crate::models::{
    BatchEntry, BatchEntryError, BatchRecommendationResponse, HealthResponse, ModelInfo,
    RawBatchRequest, RawRecommendationRequest, RecommendationResponse, SimilarItemsResponse,
};
use crate::services::model_handle::ModelHandle;
use crate::services::ranking::RankingEngine;
use crate::services::validator::RequestValidator;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "inference-gateway";

pub struct GatewayService {
    validator: RequestValidator,
    engine: RankingEngine,
    model: Arc<ModelHandle>,
    /// Used by reloads that do not name a path
    default_model_path: String,
    /// Reloads may only name paths under this directory
    model_root: PathBuf,
}

impl GatewayService {
    pub fn new(
        validator: RequestValidator,
        engine: RankingEngine,
        model: Arc<ModelHandle>,
        default_model_path: impl Into<String>,
    ) -> Self {
        let default_model_path = default_model_path.into();
        let model_root = Path::new(&default_model_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            validator,
            engine,
            model,
            default_model_path,
            model_root,
        }
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub async fn recommend(&self, raw: RawRecommendationRequest) -> Result<RecommendationResponse> {
        let request = self.validator.validate(raw)?;
        self.ensure_model_ready()?;

        info!(
            subject_id = %request.subject_id,
            result_limit = request.result_limit,
            exclusions = request.exclusions.len(),
            "Generating recommendations"
        );

        let ranking = self
            .engine
            .rank(
                &request.subject_id,
                request.result_limit,
                &request.exclusions,
                &request.context,
            )
            .await?;

        Ok(RecommendationResponse::new(
            request.subject_id,
            ranking.items,
            ranking.model_version,
        ))
    }

    pub async fn similar(
        &self,
        item_id: &str,
        result_limit: Option<i64>,
    ) -> Result<SimilarItemsResponse> {
        let item_id = self.validator.validate_subject(Some(item_id))?;
        let result_limit = self.validator.validate_limit(result_limit)?;
        self.ensure_model_ready()?;

        info!(item_id = %item_id, result_limit, "Finding similar items");

        let ranking = self
            .engine
            .similar(&item_id, result_limit, &HashSet::new())
            .await?;

        Ok(SimilarItemsResponse {
            item_id,
            count: ranking.items.len(),
            items: ranking.items,
            model_version: ranking.model_version,
        })
    }

    /// Ranks every subject independently; one failing subject never aborts the rest.
    pub async fn batch_recommend(
        &self,
        raw: RawBatchRequest,
    ) -> Result<BatchRecommendationResponse> {
        let plan = self.validator.validate_batch(raw)?;
        self.ensure_model_ready()?;

        info!(
            subjects = plan.subject_ids.len(),
            result_limit = plan.result_limit,
            "Generating batch recommendations"
        );

        let result_limit = plan.result_limit;
        let entries = join_all(plan.subject_ids.into_iter().map(|subject_id| async move {
            let raw = RawRecommendationRequest {
                subject_id: Some(subject_id.clone()),
                result_limit: None,
                exclusions: None,
                context: None,
            };

            match self.recommend_one(raw, result_limit).await {
                Ok(response) => BatchEntry::from(response),
                Err(err) => BatchEntry::Error {
                    subject_id,
                    error: BatchEntryError {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    },
                },
            }
        }))
        .await;

        let response = BatchRecommendationResponse::new(entries);
        if response.failed > 0 {
            let failed_subjects: Vec<&str> = response
                .results
                .iter()
                .filter(|entry| !entry.is_ok())
                .map(BatchEntry::subject_id)
                .collect();
            warn!(
                failed = response.failed,
                succeeded = response.succeeded,
                failed_subjects = ?failed_subjects,
                "Batch completed with partial failures"
            );
        }

        Ok(response)
    }

    async fn recommend_one(
        &self,
        raw: RawRecommendationRequest,
        result_limit: usize,
    ) -> Result<RecommendationResponse> {
        let mut request = self.validator.validate(raw)?;
        request.result_limit = result_limit;

        let ranking = self
            .engine
            .rank(
                &request.subject_id,
                request.result_limit,
                &request.exclusions,
                &request.context,
            )
            .await?;

        Ok(RecommendationResponse::new(
            request.subject_id,
            ranking.items,
            ranking.model_version,
        ))
    }

    /// Reload the model from `path`, or from the configured path when none is given.
    ///
    /// Relative paths resolve against the directory holding the configured model.
    /// Anything that would leave that directory is rejected before touching the filesystem.
    pub async fn reload_model(&self, path: Option<&str>) -> Result<ModelInfo> {
        let path = match path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(requested) => self.resolve_reload_path(requested)?,
            None => PathBuf::from(&self.default_model_path),
        };

        info!(path = %path.display(), "Model reload requested");
        Ok(self.model.load(&path).await?)
    }

    fn resolve_reload_path(&self, requested: &str) -> Result<PathBuf> {
        let candidate = self.model_root.join(requested);
        if is_within(&self.model_root, &candidate) {
            Ok(candidate)
        } else {
            warn!(requested = %requested, "Rejected reload outside the model directory");
            Err(ValidationError::ModelPathNotAllowed.into())
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.model.info()
    }

    /// Never fails: an unloaded model reports `degraded`.
    pub fn health(&self) -> HealthResponse {
        let model_loaded = self.model.is_ready();
        HealthResponse {
            status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
            service: SERVICE_NAME.to_string(),
            model_loaded,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn ensure_model_ready(&self) -> Result<()> {
        if self.model.is_ready() {
            Ok(())
        } else {
            warn!("Rejecting request: model not loaded");
            Err(GatewayError::ModelUnavailable)
        }
    }
}

/// Lexical containment check; `..` is refused outright.
fn is_within(root: &Path, candidate: &Path) -> bool {
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }

    let strip = |path: &Path| -> PathBuf {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    let root = strip(root);
    let candidate = strip(candidate);

    if root.as_os_str().is_empty() {
        candidate.is_relative()
    } else {
        candidate.starts_with(&root)
    }
}
