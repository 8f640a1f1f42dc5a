//! Catalog import: pull products from the storefront into the catalog.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::catalog_store::CatalogStore;
use crate::external::ShopClient;
use crate::jobs::{AdapterError, ItemOutcome, JobKind, SyncAdapter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImportItem {
    pub external_id: String,
}

/// Fetches one storefront product and upserts it.
///
/// Idempotent: the upsert is keyed by external id and merges rather than
/// appends.
pub struct CatalogImportAdapter {
    shop: ShopClient,
    store: Arc<dyn CatalogStore>,
}

impl CatalogImportAdapter {
    pub fn new(shop: ShopClient, store: Arc<dyn CatalogStore>) -> Self {
        Self { shop, store }
    }
}

#[async_trait]
impl SyncAdapter for CatalogImportAdapter {
    type Item = CatalogImportItem;

    fn kind(&self) -> JobKind {
        JobKind::CatalogImport
    }

    fn item_key(&self, item: &CatalogImportItem) -> String {
        item.external_id.clone()
    }

    async fn process(&self, item: &CatalogImportItem) -> Result<ItemOutcome, AdapterError> {
        let incoming = self.shop.fetch_product(&item.external_id).await?;
        if incoming.external_id != item.external_id {
            return Err(AdapterError::item(format!(
                "storefront returned product {} for {}",
                incoming.external_id, item.external_id
            )));
        }

        let product = self.store.upsert_product(incoming).await?;
        debug!(external_id = %product.external_id(), sku = %product.sku(), "product imported");

        Ok(ItemOutcome::new(format!("Imported {}", product.sku())).with_payload(json!({
            "externalId": product.external_id(),
            "sku": product.sku(),
            "title": product.title(),
        })))
    }
}
