/// Item Catalog Lookup
///
/// Supplies display metadata (name, category, price, ...) for ranked items.
use crate::models::ItemMetadata;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Raised by remote catalog backends that cannot be reached
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load catalog from {path}: {reason}")]
    Load { path: String, reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Metadata for the requested ids. Unknown ids are simply absent from the result.
    async fn lookup(
        &self,
        item_ids: &[String],
    ) -> Result<HashMap<String, ItemMetadata>, CatalogError>;
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: HashMap<String, ItemMetadata>,
}

impl InMemoryCatalog {
    pub fn new(items: HashMap<String, ItemMetadata>) -> Self {
        Self { items }
    }

    /// Load a JSON object of `item_id -> metadata`.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| CatalogError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let items: HashMap<String, ItemMetadata> =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            path = %path.display(),
            item_count = items.len(),
            "Catalog loaded"
        );

        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn lookup(
        &self,
        item_ids: &[String],
    ) -> Result<HashMap<String, ItemMetadata>, CatalogError> {
        Ok(item_ids
            .iter()
            .filter_map(|id| self.items.get(id).map(|meta| (id.clone(), meta.clone())))
            .collect())
    }
}
