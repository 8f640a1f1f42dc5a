//! Storefront (e-commerce platform) client.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use catalogsync_catalog::{ImportedProduct, PricingMetadata, ProductStatus};

use super::http::{check_status, endpoint, parse_base_url, HttpClientBuilder, HttpError};

const SERVICE: &str = "shop";

/// Header carrying the storefront access token.
pub const ACCESS_TOKEN_HEADER: &str = "X-Shop-Access-Token";

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    product: ShopProduct,
}

#[derive(Debug, Deserialize)]
struct ShopProduct {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    variants: Vec<ShopVariant>,
    #[serde(default)]
    image: Option<ShopImage>,
}

#[derive(Debug, Deserialize)]
struct ShopVariant {
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopImage {
    src: String,
}

#[derive(Debug, Deserialize)]
struct InventoryEnvelope {
    inventory_levels: Vec<InventoryLevel>,
}

/// Stock of one inventory item at one location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InventoryLevel {
    pub inventory_item_id: serde_json::Value,
    #[serde(default)]
    pub location_id: Option<serde_json::Value>,
    /// `null` when the location does not track this item.
    #[serde(default)]
    pub available: Option<i64>,
}

/// Client for the storefront admin API.
#[derive(Debug, Clone)]
pub struct ShopClient {
    http: Client,
    base_url: Url,
}

impl ShopClient {
    pub fn new(base_url: impl AsRef<str>, token: &str, timeout: Duration) -> Result<Self, HttpError> {
        let http = HttpClientBuilder::new()
            .timeout(timeout)
            .default_header(ACCESS_TOKEN_HEADER, token)
            .build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: impl AsRef<str>) -> Result<Self, HttpError> {
        Ok(Self {
            http,
            base_url: parse_base_url(base_url.as_ref())?,
        })
    }

    /// Fetch one product and map it to an import snapshot.
    pub async fn fetch_product(&self, external_id: &str) -> Result<ImportedProduct, HttpError> {
        let file = format!("{external_id}.json");
        let url = endpoint(SERVICE, &self.base_url, &["products", file.as_str()])?;
        debug!(url = %url, "fetching product");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;
        let envelope: ProductEnvelope = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;

        map_product(envelope.product)
    }

    /// Fetch stock levels for the given inventory items across all locations.
    pub async fn fetch_inventory_levels(&self, inventory_item_ids: &[&str]) -> Result<Vec<InventoryLevel>, HttpError> {
        let url = endpoint(SERVICE, &self.base_url, &["inventory_levels.json"])?;
        let ids = inventory_item_ids.join(",");

        let response = self
            .http
            .get(url)
            .query(&[("inventory_item_ids", ids.as_str())])
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;
        let envelope: InventoryEnvelope = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;

        Ok(envelope.inventory_levels)
    }
}

/// Total available quantity across locations. Untracked locations count as zero.
pub fn total_available(levels: &[InventoryLevel]) -> i64 {
    levels.iter().filter_map(|l| l.available).sum()
}

/// Parse a decimal price string ("19.99") into minor units.
pub fn parse_price_cents(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (whole, frac) = match raw.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (raw, ""),
    };
    if whole.is_empty() || frac.len() > 2 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: u64 = whole.parse().ok()?;
    let frac: u64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<u64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn map_product(product: ShopProduct) -> Result<ImportedProduct, HttpError> {
    let decode = |message: &str| HttpError::Decode {
        service: SERVICE,
        message: message.to_string(),
    };

    let external_id = id_string(&product.id).ok_or_else(|| decode("product id missing"))?;
    let variant = product.variants.first();
    let sku = variant
        .and_then(|v| v.sku.clone())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| decode("product has no SKU"))?;
    let base_price = variant.and_then(|v| v.price.as_deref()).and_then(parse_price_cents);

    Ok(ImportedProduct {
        external_id,
        sku,
        title: product.title,
        description: product.body_html.filter(|d| !d.is_empty()),
        status: product
            .status
            .as_deref()
            .map(ProductStatus::from_storefront)
            .unwrap_or_default(),
        pricing: PricingMetadata {
            base_price,
            currency: product.currency,
        },
        image_url: product.image.map(|i| i.src),
    })
}
