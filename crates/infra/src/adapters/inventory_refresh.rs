//! Inventory refresh: set catalog quantities from storefront stock levels.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog_store::CatalogStore;
use crate::external::shop::total_available;
use crate::external::ShopClient;
use crate::jobs::{AdapterError, ItemOutcome, JobKind, SyncAdapter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRefreshItem {
    pub external_id: String,
    pub inventory_item_id: String,
}

/// Sums available stock across locations and stores the absolute quantity.
///
/// Idempotent: the quantity is set, never incremented.
pub struct InventoryRefreshAdapter {
    shop: ShopClient,
    store: Arc<dyn CatalogStore>,
}

impl InventoryRefreshAdapter {
    pub fn new(shop: ShopClient, store: Arc<dyn CatalogStore>) -> Self {
        Self { shop, store }
    }
}

#[async_trait]
impl SyncAdapter for InventoryRefreshAdapter {
    type Item = InventoryRefreshItem;

    fn kind(&self) -> JobKind {
        JobKind::InventoryRefresh
    }

    fn item_key(&self, item: &InventoryRefreshItem) -> String {
        item.external_id.clone()
    }

    async fn process(&self, item: &InventoryRefreshItem) -> Result<ItemOutcome, AdapterError> {
        if self.store.get_product(&item.external_id).await?.is_none() {
            return Err(AdapterError::item(format!(
                "product {} is not in the catalog",
                item.external_id
            )));
        }

        let levels = self
            .shop
            .fetch_inventory_levels(&[item.inventory_item_id.as_str()])
            .await?;
        let quantity = total_available(&levels);
        self.store.set_inventory(&item.external_id, quantity).await?;

        Ok(ItemOutcome::new(format!("Inventory set to {quantity}")).with_payload(json!({
            "externalId": item.external_id,
            "quantity": quantity,
            "locations": levels.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::{imported, spawn, DownStore};
    use crate::catalog_store::InMemoryCatalogStore;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn levels(Query(q): Query<HashMap<String, String>>) -> axum::response::Response {
        match q.get("inventory_item_ids").map(String::as_str) {
            Some("busy") => (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "2")]).into_response(),
            Some(id) => Json(json!({
                "inventory_levels": [
                    { "inventory_item_id": id, "location_id": 1, "available": 3 },
                    { "inventory_item_id": id, "location_id": 2, "available": 5 }
                ]
            }))
            .into_response(),
            None => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    async fn setup() -> (InventoryRefreshAdapter, Arc<InMemoryCatalogStore>) {
        let url = spawn(Router::new().route("/inventory_levels.json", get(levels))).await;
        let store = Arc::new(InMemoryCatalogStore::new());
        store.upsert_product(imported("1", "a.png")).await.unwrap();
        let shop = ShopClient::new(url, "token", Duration::from_secs(5)).unwrap();
        (InventoryRefreshAdapter::new(shop, store.clone()), store)
    }

    fn item(external_id: &str, inventory_item_id: &str) -> InventoryRefreshItem {
        InventoryRefreshItem {
            external_id: external_id.to_string(),
            inventory_item_id: inventory_item_id.to_string(),
        }
    }

    #[tokio::test]
    async fn sets_absolute_quantity() {
        let (adapter, store) = setup().await;
        adapter.process(&item("1", "900")).await.unwrap();
        let outcome = adapter.process(&item("1", "900")).await.unwrap();

        assert_eq!(outcome.payload["quantity"], 8);
        assert_eq!(store.get_product("1").await.unwrap().unwrap().inventory_quantity(), Some(8));
    }

    #[tokio::test]
    async fn unknown_product_is_an_item_failure() {
        let (adapter, _) = setup().await;
        let err = adapter.process(&item("77", "900")).await.unwrap_err();
        assert_eq!(err, AdapterError::item("product 77 is not in the catalog"));
    }

    #[tokio::test]
    async fn throttling_is_reported_with_retry_after() {
        let (adapter, _) = setup().await;
        let err = adapter.process(&item("1", "busy")).await.unwrap_err();
        assert_eq!(
            err,
            AdapterError::Throttled {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn unreachable_store_is_catastrophic() {
        let url = spawn(Router::new().route("/inventory_levels.json", get(levels))).await;
        let shop = ShopClient::new(url, "token", Duration::from_secs(5)).unwrap();
        let adapter = InventoryRefreshAdapter::new(shop, Arc::new(DownStore));
        assert!(matches!(
            adapter.process(&item("1", "900")).await.unwrap_err(),
            AdapterError::Catastrophic(_)
        ));
    }
}
