use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use catalogsync_catalog::{CatalogProduct, ImportedProduct};

use super::{CatalogStore, StoreError};

/// Process-local catalog store.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    products: RwLock<BTreeMap<String, CatalogProduct>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(
        &self,
        external_id: &str,
        f: impl FnOnce(&mut CatalogProduct) -> Result<(), StoreError>,
    ) -> Result<CatalogProduct, StoreError> {
        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        let product = products
            .get_mut(external_id)
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))?;
        f(product)?;
        Ok(product.clone())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn upsert_product(&self, incoming: ImportedProduct) -> Result<CatalogProduct, StoreError> {
        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        let merged = CatalogProduct::merge_import(products.get(&incoming.external_id), incoming, Utc::now())?;
        products.insert(merged.external_id().to_string(), merged.clone());
        Ok(merged)
    }

    async fn get_product(&self, external_id: &str) -> Result<Option<CatalogProduct>, StoreError> {
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        Ok(products.get(external_id).cloned())
    }

    async fn set_inventory(&self, external_id: &str, quantity: i64) -> Result<CatalogProduct, StoreError> {
        self.update(external_id, |p| {
            p.set_inventory(quantity, Utc::now());
            Ok(())
        })
    }

    async fn set_processed_image(&self, external_id: &str, url: &str) -> Result<CatalogProduct, StoreError> {
        self.update(external_id, |p| Ok(p.set_processed_image(url, Utc::now())?))
    }

    async fn list_products(&self) -> Result<Vec<CatalogProduct>, StoreError> {
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        Ok(products.values().cloned().collect())
    }
}
