/// Model Lifecycle Handle
///
/// Owns the currently served model and its lifecycle
/// (`unloaded -> loading -> ready | load_failed`).
///
/// The live model is an `Arc` snapshot. Loading builds the replacement off to the side
/// and publishes it with a single pointer swap, so a reader either sees the previous
/// model or the complete new one. Requests clone the snapshot and keep using it even if
/// a reload lands mid-request.
use crate::error::LoadError;
use crate::metrics;
use crate::models::{ModelInfo, ModelStatus};
use crate::services::catalog::Catalog;
use crate::services::embedding_model::EmbeddingModel;
use crate::services::scorer::Scorer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_MODEL_VERSION: &str = "v1.0";

/// A fully constructed model ready to serve inference calls.
pub struct LoadedModel {
    pub scorer: Arc<dyn Scorer>,
    /// Metadata shipped alongside the model, if any
    pub catalog: Option<Arc<dyn Catalog>>,
    pub version: String,
    pub path: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

struct Lifecycle {
    status: ModelStatus,
    last_error: Option<String>,
}

pub struct ModelHandle {
    current: RwLock<Option<Arc<LoadedModel>>>,
    lifecycle: RwLock<Lifecycle>,
    /// Serializes load/unload so lifecycle transitions never interleave
    load_lock: tokio::sync::Mutex<()>,
    version_override: Option<String>,
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelHandle {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            lifecycle: RwLock::new(Lifecycle {
                status: ModelStatus::Unloaded,
                last_error: None,
            }),
            load_lock: tokio::sync::Mutex::new(()),
            version_override: None,
        }
    }

    /// Report `version` for every model loaded through this handle.
    pub fn with_version_override(mut self, version: Option<String>) -> Self {
        self.version_override = version.filter(|v| !v.trim().is_empty());
        self
    }

    /// Load the embedding bundle at `path` and publish it.
    ///
    /// On failure the previously published model, if any, keeps serving.
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<ModelInfo, LoadError> {
        let path = path.as_ref();
        let _guard = self.load_lock.lock().await;
        self.set_status(ModelStatus::Loading, None);

        info!("Loading model from {}", path.display());

        match EmbeddingModel::load(path).await {
            Ok(bundle) => {
                let version = self
                    .version_override
                    .clone()
                    .or_else(|| bundle.model.version().map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());

                let catalog: Option<Arc<dyn Catalog>> = if bundle.catalog.is_empty() {
                    None
                } else {
                    Some(Arc::new(bundle.catalog))
                };

                self.install(LoadedModel {
                    scorer: Arc::new(bundle.model),
                    catalog,
                    version,
                    path: Some(bundle.path.display().to_string()),
                    loaded_at: Utc::now(),
                });

                info!("Model loaded successfully");
                Ok(self.info())
            }
            Err(e) => {
                match &e {
                    LoadError::NotFound(_) => warn!("Model not found at {}", path.display()),
                    _ => error!("Failed to load model: {}", e),
                }
                self.set_status(ModelStatus::LoadFailed, Some(e.summary().to_string()));
                Err(e)
            }
        }
    }

    /// Publish an already constructed backend.
    pub fn publish(
        &self,
        scorer: Arc<dyn Scorer>,
        catalog: Option<Arc<dyn Catalog>>,
        version: impl Into<String>,
    ) {
        let version = self
            .version_override
            .clone()
            .unwrap_or_else(|| version.into());

        self.install(LoadedModel {
            scorer,
            catalog,
            version,
            path: None,
            loaded_at: Utc::now(),
        });
    }

    fn install(&self, model: LoadedModel) {
        let version = model.version.clone();
        *self.current.write() = Some(Arc::new(model));
        self.set_status(ModelStatus::Ready, None);
        metrics::set_model_loaded(true);
        info!(model_version = %version, "Model published");
    }

    /// Release the model. Subsequent readiness checks report not-ready.
    pub async fn unload(&self) {
        let _guard = self.load_lock.lock().await;
        self.current.write().take();
        self.set_status(ModelStatus::Unloaded, None);
        metrics::set_model_loaded(false);
        info!("Model unloaded");
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Current model, if one is published.
    pub fn snapshot(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().clone()
    }

    pub fn status(&self) -> ModelStatus {
        self.lifecycle.read().status
    }

    pub fn info(&self) -> ModelInfo {
        let snapshot = self.snapshot();
        let lifecycle = self.lifecycle.read();

        ModelInfo {
            status: lifecycle.status,
            ready: snapshot.is_some(),
            version: snapshot.as_ref().map(|m| m.version.clone()),
            path: snapshot.as_ref().and_then(|m| m.path.clone()),
            loaded_at: snapshot.as_ref().map(|m| m.loaded_at),
            last_error: lifecycle.last_error.clone(),
        }
    }

    fn set_status(&self, status: ModelStatus, last_error: Option<String>) {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.status = status;
        lifecycle.last_error = last_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(version: &str) -> String {
        format!(
            r#"{{
                "version": "{}",
                "dimension": 2,
                "users": {{ "u1": [1.0, 0.0] }},
                "items": {{ "item_1": [1.0, 0.0], "item_2": [0.0, 1.0] }},
                "catalog": {{ "item_1": {{ "name": "Product 1" }} }}
            }}"#,
            version
        )
    }

    #[tokio::test]
    async fn test_starts_unloaded() {
        let handle = ModelHandle::new();
        assert!(!handle.is_ready());
        assert_eq!(handle.status(), ModelStatus::Unloaded);
        assert!(handle.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_load_missing_path_degrades() {
        let handle = ModelHandle::new();
        let result = handle.load("/nonexistent/two_tower").await;

        assert!(matches!(result, Err(LoadError::NotFound(_))));
        assert!(!handle.is_ready());

        let info = handle.info();
        assert_eq!(info.status, ModelStatus::LoadFailed);
        assert_eq!(info.last_error.as_deref(), Some("model bundle not found"));
    }

    #[tokio::test]
    async fn test_load_then_unload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), bundle("v3")).unwrap();

        let handle = ModelHandle::new();
        let info = handle.load(dir.path()).await.unwrap();

        assert!(info.ready);
        assert_eq!(info.status, ModelStatus::Ready);
        assert_eq!(info.version.as_deref(), Some("v3"));
        assert!(handle.snapshot().unwrap().catalog.is_some());

        handle.unload().await;
        assert!(!handle.is_ready());
        assert_eq!(handle.status(), ModelStatus::Unloaded);
    }

    #[tokio::test]
    async fn test_reload_replaces_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, bundle("v1")).unwrap();

        let handle = ModelHandle::new();
        handle.load(&path).await.unwrap();
        let before = handle.snapshot().unwrap();

        std::fs::write(&path, bundle("v2")).unwrap();
        handle.load(&path).await.unwrap();

        // In-flight holders keep the old snapshot
        assert_eq!(before.version, "v1");
        assert_eq!(handle.snapshot().unwrap().version, "v2");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_serving_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, bundle("v1")).unwrap();

        let handle = ModelHandle::new();
        handle.load(&path).await.unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        let result = handle.load(&path).await;

        assert!(matches!(result, Err(LoadError::Invalid(_))));
        assert!(handle.is_ready());
        assert_eq!(handle.snapshot().unwrap().version, "v1");
        assert_eq!(handle.status(), ModelStatus::LoadFailed);

        let last_error = handle.info().last_error.unwrap_or_default();
        assert_eq!(last_error, "model bundle is invalid");
        assert!(!last_error.contains("model.json"));
    }

    #[tokio::test]
    async fn test_version_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), bundle("v1")).unwrap();

        let handle = ModelHandle::new().with_version_override(Some("canary".to_string()));
        let info = handle.load(dir.path()).await.unwrap();
        assert_eq!(info.version.as_deref(), Some("canary"));
    }
}
