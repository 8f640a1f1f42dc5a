//! Image republish: strip the background from a product image and push the
//! result to the marketplace listing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::catalog_store::CatalogStore;
use crate::external::{BackgroundRemovalClient, MarketplaceClient};
use crate::jobs::{AdapterError, ItemOutcome, JobKind, SyncAdapter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepublishItem {
    pub external_id: String,
    pub sku: String,
    pub image_url: String,
}

/// Three steps per item: transform, upload, record.
///
/// Idempotent: the transform is keyed by source URL, the upload replaces
/// the listing's image set, and the recorded URL is overwritten.
pub struct ImageRepublishAdapter {
    images: BackgroundRemovalClient,
    marketplace: MarketplaceClient,
    store: Arc<dyn CatalogStore>,
}

impl ImageRepublishAdapter {
    pub fn new(
        images: BackgroundRemovalClient,
        marketplace: MarketplaceClient,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            images,
            marketplace,
            store,
        }
    }
}

#[async_trait]
impl SyncAdapter for ImageRepublishAdapter {
    type Item = ImageRepublishItem;

    fn kind(&self) -> JobKind {
        JobKind::ImageRepublish
    }

    fn item_key(&self, item: &ImageRepublishItem) -> String {
        item.sku.clone()
    }

    async fn process(&self, item: &ImageRepublishItem) -> Result<ItemOutcome, AdapterError> {
        if item.image_url.trim().is_empty() {
            return Err(AdapterError::item("no source image"));
        }

        let processed = self.images.remove_background(&item.image_url).await?;
        debug!(sku = %item.sku, processed = %processed, "background removed");

        self.marketplace.replace_listing_image(&item.sku, &processed).await?;
        self.store.set_processed_image(&item.external_id, &processed).await?;

        Ok(ItemOutcome::new(format!("Republished image for {}", item.sku)).with_payload(json!({
            "externalId": item.external_id,
            "sku": item.sku,
            "processedImageUrl": processed,
        })))
    }
}
