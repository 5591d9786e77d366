#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use inference_gateway::models::{ItemMetadata, ReasonCode, RequestContext};
use inference_gateway::services::{
    Catalog, CatalogError, GatewayService, ModelHandle, RankingEngine, RequestValidator,
    ScoredCandidates, Scorer, ScorerError,
};

/// Returns the same candidate list for every subject; listed subjects fail.
pub struct StaticScorer {
    pub candidates: Vec<(String, f32)>,
    pub failing_subjects: Vec<String>,
}

impl StaticScorer {
    pub fn new(candidates: &[(&str, f32)]) -> Self {
        Self {
            candidates: candidates
                .iter()
                .map(|(id, score)| (id.to_string(), *score))
                .collect(),
            failing_subjects: Vec::new(),
        }
    }

    /// `count` items scored strictly descending: `item_0` best.
    pub fn sequential(count: usize) -> Self {
        Self {
            candidates: (0..count)
                .map(|i| (format!("item_{}", i), 1.0 - i as f32 / (count as f32 + 1.0)))
                .collect(),
            failing_subjects: Vec::new(),
        }
    }

    pub fn failing_for(mut self, subject_id: &str) -> Self {
        self.failing_subjects.push(subject_id.to_string());
        self
    }
}

#[async_trait]
impl Scorer for StaticScorer {
    async fn score(
        &self,
        subject_id: &str,
        _context: &RequestContext,
    ) -> Result<ScoredCandidates, ScorerError> {
        if self.failing_subjects.iter().any(|s| s == subject_id) {
            return Err(ScorerError::Backend("embedding lookup exploded".to_string()));
        }
        Ok(ScoredCandidates::new(
            ReasonCode::CollaborativeFiltering,
            Box::new(self.candidates.clone().into_iter()),
        ))
    }

    async fn similar(&self, item_id: &str) -> Result<ScoredCandidates, ScorerError> {
        if !self.candidates.iter().any(|(id, _)| id == item_id) {
            return Err(ScorerError::UnknownItem(item_id.to_string()));
        }
        Ok(ScoredCandidates::new(
            ReasonCode::ItemSimilarity,
            Box::new(self.candidates.clone().into_iter()),
        ))
    }
}

/// Catalog whose backing store is always down.
pub struct UnreachableCatalog;

#[async_trait]
impl Catalog for UnreachableCatalog {
    async fn lookup(
        &self,
        _item_ids: &[String],
    ) -> Result<HashMap<String, ItemMetadata>, CatalogError> {
        Err(CatalogError::Unavailable(
            "connect to catalog-db:5432 refused".to_string(),
        ))
    }
}

/// Gateway over `scorer`, or over an unloaded model when `None`.
pub fn gateway(scorer: Option<StaticScorer>) -> (web::Data<GatewayService>, Arc<ModelHandle>) {
    gateway_with_model_path(scorer, "/nonexistent/two_tower")
}

pub fn gateway_with_model_path(
    scorer: Option<StaticScorer>,
    model_path: &str,
) -> (web::Data<GatewayService>, Arc<ModelHandle>) {
    build(scorer, model_path, None)
}

pub fn gateway_with_catalog(
    scorer: StaticScorer,
    catalog: Arc<dyn Catalog>,
) -> (web::Data<GatewayService>, Arc<ModelHandle>) {
    build(Some(scorer), "/nonexistent/two_tower", Some(catalog))
}

fn build(
    scorer: Option<StaticScorer>,
    model_path: &str,
    catalog: Option<Arc<dyn Catalog>>,
) -> (web::Data<GatewayService>, Arc<ModelHandle>) {
    let handle = Arc::new(ModelHandle::new());
    if let Some(scorer) = scorer {
        handle.publish(Arc::new(scorer), None, "v1.0");
    }

    let mut engine = RankingEngine::new(handle.clone());
    if let Some(catalog) = catalog {
        engine = engine.with_catalog(catalog);
    }

    let service = GatewayService::new(
        RequestValidator::new(10, 100, 100),
        engine,
        handle.clone(),
        model_path,
    );
    (web::Data::new(service), handle)
}

/// Minimal two-item embedding bundle.
pub fn bundle_json(version: &str) -> String {
    serde_json::json!({
        "version": version,
        "dimension": 2,
        "users": { "u1": [1.0, 0.0] },
        "items": {
            "item_a": [1.0, 0.0],
            "item_b": [0.0, 1.0]
        },
        "catalog": {
            "item_a": { "name": "Product A", "category": "mandala" }
        }
    })
    .to_string()
}
