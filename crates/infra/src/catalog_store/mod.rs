//! Catalog store: where synchronization adapters persist their side effects.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use catalogsync_catalog::{CatalogProduct, ImportedProduct};
use catalogsync_core::DomainError;

use crate::jobs::AdapterError;

pub use in_memory::InMemoryCatalogStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalogStore;

/// Catalog store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("product not found: {0}")]
    NotFound(String),

    /// The backing store cannot be reached at all.
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),

    #[error("catalog store error: {0}")]
    Backend(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<StoreError> for AdapterError {
    fn from(err: StoreError) -> Self {
        match err {
            // Every remaining item would hit the same wall.
            StoreError::Unavailable(_) => AdapterError::catastrophic(err.to_string()),
            StoreError::NotFound(_) | StoreError::Backend(_) | StoreError::Domain(_) => {
                AdapterError::item(err.to_string())
            }
        }
    }
}

/// Product persistence keyed by storefront id.
///
/// Every write is idempotent: applying the same write twice leaves the
/// same state as applying it once.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or merge an imported snapshot, preserving locally derived fields.
    async fn upsert_product(&self, incoming: ImportedProduct) -> Result<CatalogProduct, StoreError>;

    async fn get_product(&self, external_id: &str) -> Result<Option<CatalogProduct>, StoreError>;

    /// Set the absolute available quantity.
    async fn set_inventory(&self, external_id: &str, quantity: i64) -> Result<CatalogProduct, StoreError>;

    async fn set_processed_image(&self, external_id: &str, url: &str) -> Result<CatalogProduct, StoreError>;

    /// All products ordered by external id.
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, StoreError>;
}
