use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalogsync_core::{DomainError, DomainResult};

/// Product status lifecycle, as reported by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    /// Parse a storefront status string. Unknown values fall back to `Draft`.
    pub fn from_storefront(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => ProductStatus::Active,
            "archived" => ProductStatus::Archived,
            _ => ProductStatus::Draft,
        }
    }
}

/// Optional pricing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PricingMetadata {
    pub base_price: Option<u64>, // Price in smallest currency unit (e.g., cents)
    pub currency: Option<String>, // ISO currency code (e.g., "USD", "EUR")
}

/// Snapshot of a product as fetched from the storefront.
///
/// This is the input side of a catalog import; it carries only fields the
/// storefront owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedProduct {
    pub external_id: String,
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub status: ProductStatus,
    pub pricing: PricingMetadata,
    pub image_url: Option<String>,
}

/// A product as held in the local catalog.
///
/// Keyed by `external_id` (the storefront id). Inventory and the processed
/// image are derived locally by later jobs and survive re-imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    external_id: String,
    sku: String,
    title: String,
    description: Option<String>,
    status: ProductStatus,
    pricing: PricingMetadata,
    inventory_quantity: Option<i64>,
    image_url: Option<String>,
    processed_image_url: Option<String>,
    updated_at: DateTime<Utc>,
}

impl CatalogProduct {
    /// Build a catalog record from a freshly imported snapshot.
    pub fn from_import(incoming: ImportedProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        validate(&incoming)?;
        Ok(Self {
            external_id: incoming.external_id,
            sku: incoming.sku,
            title: incoming.title,
            description: incoming.description,
            status: incoming.status,
            pricing: incoming.pricing,
            inventory_quantity: None,
            image_url: incoming.image_url,
            processed_image_url: None,
            updated_at: now,
        })
    }

    /// Upsert semantics for a catalog import.
    ///
    /// Storefront-owned fields are replaced; locally derived fields
    /// (inventory, processed image) are preserved. The processed image is
    /// dropped when the source image changed, since it no longer matches.
    pub fn merge_import(
        existing: Option<&CatalogProduct>,
        incoming: ImportedProduct,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let Some(existing) = existing else {
            return Self::from_import(incoming, now);
        };

        if existing.external_id != incoming.external_id {
            return Err(DomainError::invariant("external_id mismatch"));
        }
        validate(&incoming)?;

        let processed_image_url = if existing.image_url == incoming.image_url {
            existing.processed_image_url.clone()
        } else {
            None
        };

        Ok(Self {
            external_id: incoming.external_id,
            sku: incoming.sku,
            title: incoming.title,
            description: incoming.description,
            status: incoming.status,
            pricing: incoming.pricing,
            inventory_quantity: existing.inventory_quantity,
            image_url: incoming.image_url,
            processed_image_url,
            updated_at: now,
        })
    }

    /// Set the absolute available quantity (idempotent).
    pub fn set_inventory(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.inventory_quantity = Some(quantity);
        self.updated_at = now;
    }

    /// Record the marketplace-ready image produced by background removal.
    pub fn set_processed_image(&mut self, url: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(DomainError::validation("processed image url cannot be empty"));
        }
        self.processed_image_url = Some(url);
        self.updated_at = now;
        Ok(())
    }

    /// Reassemble a record from storage without re-running import validation.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        external_id: String,
        sku: String,
        title: String,
        description: Option<String>,
        status: ProductStatus,
        pricing: PricingMetadata,
        inventory_quantity: Option<i64>,
        image_url: Option<String>,
        processed_image_url: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id,
            sku,
            title,
            description,
            status,
            pricing,
            inventory_quantity,
            image_url,
            processed_image_url,
            updated_at,
        }
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn pricing(&self) -> &PricingMetadata {
        &self.pricing
    }

    pub fn inventory_quantity(&self) -> Option<i64> {
        self.inventory_quantity
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn processed_image_url(&self) -> Option<&str> {
        self.processed_image_url.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the product can be listed on a marketplace.
    pub fn is_listable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

fn validate(incoming: &ImportedProduct) -> DomainResult<()> {
    if incoming.external_id.trim().is_empty() {
        return Err(DomainError::validation("external_id cannot be empty"));
    }
    if incoming.sku.trim().is_empty() {
        return Err(DomainError::validation("SKU cannot be empty"));
    }
    if incoming.title.trim().is_empty() {
        return Err(DomainError::validation("title cannot be empty"));
    }
    Ok(())
}
