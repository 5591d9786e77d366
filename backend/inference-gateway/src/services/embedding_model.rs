/// Two-Tower Embedding Model
///
/// Serves a retrieval model exported as a JSON bundle of user and item embeddings:
///
/// ```json
/// {
///   "version": "v1.0",
///   "dimension": 4,
///   "users": { "u1": [0.1, 0.2, 0.3, 0.4] },
///   "items": { "item_1": [0.4, 0.3, 0.2, 0.1] },
///   "item_bias": { "item_1": 0.05 },
///   "catalog": { "item_1": { "name": "Product 1", "category": "mandala" } }
/// }
/// ```
///
/// A directory path resolves to `<dir>/model.json`.
use crate::error::LoadError;
use crate::models::{ItemMetadata, ReasonCode, RequestContext};
use crate::services::catalog::InMemoryCatalog;
use crate::services::scorer::{ScoredCandidates, Scorer, ScorerError};
use async_trait::async_trait;
use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const BUNDLE_FILE_NAME: &str = "model.json";

#[derive(Debug, Deserialize)]
struct EmbeddingBundle {
    #[serde(default)]
    version: Option<String>,
    dimension: usize,
    #[serde(default)]
    users: HashMap<String, Vec<f32>>,
    items: BTreeMap<String, Vec<f32>>,
    #[serde(default)]
    item_bias: HashMap<String, f32>,
    #[serde(default)]
    catalog: HashMap<String, ItemMetadata>,
}

struct EmbeddingTables {
    item_ids: Vec<String>,
    item_index: HashMap<String, usize>,
    /// (num_items × dimension)
    items: Array2<f32>,
    item_norms: Array1<f32>,
    item_bias: Array1<f32>,
    users: HashMap<String, Array1<f32>>,
}

/// Dot-product scorer over user/item towers
#[derive(Clone)]
pub struct EmbeddingModel {
    tables: Arc<EmbeddingTables>,
    version: Option<String>,
}

/// Everything produced by loading a bundle from disk.
pub struct LoadedBundle {
    pub model: EmbeddingModel,
    pub catalog: InMemoryCatalog,
    pub path: PathBuf,
}

impl EmbeddingModel {
    /// Load a bundle from a file or a model directory.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<LoadedBundle, LoadError> {
        let path = resolve_bundle_path(path.as_ref());

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LoadError::NotFound(path.display().to_string()));
        }

        let bytes = tokio::fs::read(&path).await.map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        // Parsing and matrix construction are CPU-bound
        let (model, catalog) = tokio::task::spawn_blocking(move || Self::from_slice(&bytes))
            .await
            .map_err(|e| LoadError::Invalid(format!("loader task failed: {}", e)))??;

        debug!(
            path = %path.display(),
            items = model.item_count(),
            users = model.user_count(),
            "Embedding bundle parsed"
        );

        Ok(LoadedBundle {
            model,
            catalog,
            path,
        })
    }

    /// Parse a bundle held in memory.
    pub fn from_slice(bytes: &[u8]) -> Result<(Self, InMemoryCatalog), LoadError> {
        let bundle: EmbeddingBundle =
            serde_json::from_slice(bytes).map_err(|e| LoadError::Invalid(e.to_string()))?;
        Self::from_bundle(bundle)
    }

    fn from_bundle(bundle: EmbeddingBundle) -> Result<(Self, InMemoryCatalog), LoadError> {
        let dim = bundle.dimension;
        if dim == 0 {
            return Err(LoadError::Invalid("dimension must be positive".to_string()));
        }
        if bundle.items.is_empty() {
            return Err(LoadError::Invalid("bundle contains no items".to_string()));
        }

        let mut item_ids = Vec::with_capacity(bundle.items.len());
        let mut flat = Vec::with_capacity(bundle.items.len() * dim);
        for (id, vector) in bundle.items {
            check_dimension("item", &id, &vector, dim)?;
            flat.extend_from_slice(&vector);
            item_ids.push(id);
        }

        let items = Array2::from_shape_vec((item_ids.len(), dim), flat)
            .map_err(|e| LoadError::Invalid(format!("item matrix: {}", e)))?;
        let item_norms = items.rows().into_iter().map(|row| row.dot(&row).sqrt()).collect();
        let item_bias = item_ids
            .iter()
            .map(|id| bundle.item_bias.get(id).copied().unwrap_or(0.0))
            .collect();
        let item_index = item_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut users = HashMap::with_capacity(bundle.users.len());
        for (id, vector) in bundle.users {
            check_dimension("user", &id, &vector, dim)?;
            users.insert(id, Array1::from(vector));
        }

        let model = Self {
            tables: Arc::new(EmbeddingTables {
                item_ids,
                item_index,
                items,
                item_norms,
                item_bias,
                users,
            }),
            version: bundle.version,
        };

        Ok((model, InMemoryCatalog::new(bundle.catalog)))
    }

    /// Version declared inside the bundle, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn item_count(&self) -> usize {
        self.tables.item_ids.len()
    }

    pub fn user_count(&self) -> usize {
        self.tables.users.len()
    }
}

fn resolve_bundle_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(BUNDLE_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

fn check_dimension(kind: &str, id: &str, vector: &[f32], dim: usize) -> Result<(), LoadError> {
    if vector.len() != dim {
        return Err(LoadError::Invalid(format!(
            "{} {} has {} dimensions, expected {}",
            kind,
            id,
            vector.len(),
            dim
        )));
    }
    Ok(())
}

#[async_trait]
impl Scorer for EmbeddingModel {
    async fn score(
        &self,
        subject_id: &str,
        _context: &RequestContext,
    ) -> Result<ScoredCandidates, ScorerError> {
        let tables = Arc::clone(&self.tables);

        let Some(user) = tables.users.get(subject_id).cloned() else {
            // Cold start: rank by item bias alone
            let candidates = (0..tables.item_ids.len())
                .map(move |i| (tables.item_ids[i].clone(), tables.item_bias[i]));
            return Ok(ScoredCandidates::new(
                ReasonCode::Popularity,
                Box::new(candidates),
            ));
        };

        let candidates = (0..tables.item_ids.len()).map(move |i| {
            let score = tables.items.row(i).dot(&user) + tables.item_bias[i];
            (tables.item_ids[i].clone(), score)
        });

        Ok(ScoredCandidates::new(
            ReasonCode::CollaborativeFiltering,
            Box::new(candidates),
        ))
    }

    async fn similar(&self, item_id: &str) -> Result<ScoredCandidates, ScorerError> {
        let tables = Arc::clone(&self.tables);
        let query_idx = *tables
            .item_index
            .get(item_id)
            .ok_or_else(|| ScorerError::UnknownItem(item_id.to_string()))?;

        let candidates = (0..tables.item_ids.len()).map(move |i| {
            let denom = tables.item_norms[i] * tables.item_norms[query_idx];
            let cosine = if denom > f32::EPSILON {
                tables.items.row(i).dot(&tables.items.row(query_idx)) / denom
            } else {
                0.0
            };
            (tables.item_ids[i].clone(), cosine)
        });

        Ok(ScoredCandidates::new(
            ReasonCode::ItemSimilarity,
            Box::new(candidates),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::Catalog;

    const BUNDLE: &str = r#"{
        "version": "v2.3",
        "dimension": 2,
        "users": { "u1": [1.0, 0.0] },
        "items": {
            "item_a": [0.9, 0.1],
            "item_b": [0.1, 0.9],
            "item_c": [0.8, 0.0]
        },
        "item_bias": { "item_b": 0.5 },
        "catalog": { "item_a": { "name": "Product A" } }
    }"#;

    fn collect(scored: ScoredCandidates) -> HashMap<String, f32> {
        scored.candidates.collect()
    }

    #[tokio::test]
    async fn test_user_scores_are_dot_plus_bias() {
        let (model, _) = EmbeddingModel::from_slice(BUNDLE.as_bytes()).unwrap();
        let scored = model.score("u1", &RequestContext::new()).await.unwrap();

        assert_eq!(scored.reason, ReasonCode::CollaborativeFiltering);
        let scores = collect(scored);
        assert!((scores["item_a"] - 0.9).abs() < 1e-6);
        assert!((scores["item_b"] - 0.6).abs() < 1e-6);
        assert!((scores["item_c"] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unknown_user_falls_back_to_popularity() {
        let (model, _) = EmbeddingModel::from_slice(BUNDLE.as_bytes()).unwrap();
        let scored = model.score("stranger", &RequestContext::new()).await.unwrap();

        assert_eq!(scored.reason, ReasonCode::Popularity);
        let scores = collect(scored);
        assert_eq!(scores.len(), 3);
        assert!((scores["item_b"] - 0.5).abs() < 1e-6);
        assert_eq!(scores["item_a"], 0.0);
    }

    #[tokio::test]
    async fn test_similar_uses_cosine() {
        let (model, _) = EmbeddingModel::from_slice(BUNDLE.as_bytes()).unwrap();
        let scores = collect(model.similar("item_a").await.unwrap());

        assert!((scores["item_a"] - 1.0).abs() < 1e-5);
        assert!(scores["item_c"] > scores["item_b"]);
    }

    #[tokio::test]
    async fn test_similar_unknown_item() {
        let (model, _) = EmbeddingModel::from_slice(BUNDLE.as_bytes()).unwrap();
        let result = model.similar("missing").await;
        assert!(matches!(result, Err(ScorerError::UnknownItem(_))));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let bundle = r#"{"dimension": 3, "items": {"item_a": [1.0, 2.0]}}"#;
        let result = EmbeddingModel::from_slice(bundle.as_bytes());
        assert!(matches!(result, Err(LoadError::Invalid(_))));
    }

    #[test]
    fn test_empty_items_rejected() {
        let bundle = r#"{"dimension": 2, "items": {}}"#;
        let result = EmbeddingModel::from_slice(bundle.as_bytes());
        assert!(matches!(result, Err(LoadError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), BUNDLE).unwrap();

        let bundle = EmbeddingModel::load(dir.path()).await.unwrap();
        assert_eq!(bundle.model.version(), Some("v2.3"));
        assert_eq!(bundle.model.item_count(), 3);
        assert_eq!(bundle.model.user_count(), 1);
        assert!(bundle.path.ends_with("model.json"));

        let meta = bundle
            .catalog
            .lookup(&["item_a".to_string()])
            .await
            .unwrap();
        assert_eq!(meta["item_a"]["name"], "Product A");
    }

    #[tokio::test]
    async fn test_load_missing_path() {
        let result = EmbeddingModel::load("/nonexistent/two_tower").await;
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }
}
