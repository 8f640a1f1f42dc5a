//! Postgres-backed catalog store.
//!
//! Upserts run as a single `INSERT ... ON CONFLICT (external_id) DO UPDATE`
//! statement so concurrent imports of the same product cannot interleave a
//! read-merge-write cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use catalogsync_catalog::{CatalogProduct, ImportedProduct, PricingMetadata, ProductStatus};
use catalogsync_core::DomainError;

use super::{CatalogStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_products (
    external_id         TEXT PRIMARY KEY,
    sku                 TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT,
    status              TEXT NOT NULL,
    price_cents         BIGINT,
    currency            TEXT,
    inventory_quantity  BIGINT,
    image_url           TEXT,
    processed_image_url TEXT,
    updated_at          TIMESTAMPTZ NOT NULL
)
"#;

const COLUMNS: &str = "external_id, sku, title, description, status, price_cents, currency, \
                       inventory_quantity, image_url, processed_image_url, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool sized for adapter concurrency.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the products table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn update_returning(
        &self,
        operation: &'static str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
        external_id: &str,
    ) -> Result<CatalogProduct, StoreError> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or_else(|| StoreError::NotFound(external_id.to_string()))?;
        row_to_product(&row)
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, incoming), fields(external_id = %incoming.external_id), err)]
    async fn upsert_product(&self, incoming: ImportedProduct) -> Result<CatalogProduct, StoreError> {
        let product = CatalogProduct::from_import(incoming, Utc::now())?;
        let price_cents = price_column(product.pricing().base_price)?;
        let sql = format!(
            r#"
            INSERT INTO catalog_products ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8, NULL, $9)
            ON CONFLICT (external_id) DO UPDATE SET
                sku = EXCLUDED.sku,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                status = EXCLUDED.status,
                price_cents = EXCLUDED.price_cents,
                currency = EXCLUDED.currency,
                processed_image_url = CASE
                    WHEN catalog_products.image_url IS NOT DISTINCT FROM EXCLUDED.image_url
                    THEN catalog_products.processed_image_url
                    ELSE NULL
                END,
                image_url = EXCLUDED.image_url,
                updated_at = EXCLUDED.updated_at
            RETURNING {COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(product.external_id())
            .bind(product.sku())
            .bind(product.title())
            .bind(product.description())
            .bind(status_str(product.status()))
            .bind(price_cents)
            .bind(product.pricing().currency.as_deref())
            .bind(product.image_url())
            .bind(product.updated_at())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_product", e))?;
        row_to_product(&row)
    }

    async fn get_product(&self, external_id: &str) -> Result<Option<CatalogProduct>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM catalog_products WHERE external_id = $1");
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn set_inventory(&self, external_id: &str, quantity: i64) -> Result<CatalogProduct, StoreError> {
        let sql = format!(
            "UPDATE catalog_products SET inventory_quantity = $2, updated_at = $3 \
             WHERE external_id = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(external_id).bind(quantity).bind(Utc::now());
        self.update_returning("set_inventory", query, external_id).await
    }

    async fn set_processed_image(&self, external_id: &str, url: &str) -> Result<CatalogProduct, StoreError> {
        if url.trim().is_empty() {
            return Err(DomainError::validation("processed image url cannot be empty").into());
        }
        let sql = format!(
            "UPDATE catalog_products SET processed_image_url = $2, updated_at = $3 \
             WHERE external_id = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(external_id).bind(url).bind(Utc::now());
        self.update_returning("set_processed_image", query, external_id).await
    }

    async fn list_products(&self) -> Result<Vec<CatalogProduct>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM catalog_products ORDER BY external_id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(row_to_product).collect()
    }
}

fn status_str(status: ProductStatus) -> &'static str {
    match status {
        ProductStatus::Draft => "draft",
        ProductStatus::Active => "active",
        ProductStatus::Archived => "archived",
    }
}

/// Minor-unit prices are stored as BIGINT.
fn price_column(base_price: Option<u64>) -> Result<Option<i64>, StoreError> {
    base_price
        .map(i64::try_from)
        .transpose()
        .map_err(|_| DomainError::validation("base price exceeds the storable range").into())
}

fn row_to_product(row: &PgRow) -> Result<CatalogProduct, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode product row: {e}"));

    let status: String = row.try_get("status").map_err(decode)?;
    let price_cents: Option<i64> = row.try_get("price_cents").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    Ok(CatalogProduct::restore(
        row.try_get("external_id").map_err(decode)?,
        row.try_get("sku").map_err(decode)?,
        row.try_get("title").map_err(decode)?,
        row.try_get("description").map_err(decode)?,
        ProductStatus::from_storefront(&status),
        PricingMetadata {
            base_price: price_cents.and_then(|p| u64::try_from(p).ok()),
            currency: row.try_get("currency").map_err(decode)?,
        },
        row.try_get("inventory_quantity").map_err(decode)?,
        row.try_get("image_url").map_err(decode)?,
        row.try_get("processed_image_url").map_err(decode)?,
        updated_at,
    ))
}

/// Connection-level failures mean the store is unreachable; everything else
/// is scoped to the statement that failed.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(format!("{operation}: {err}")),
        sqlx::Error::Database(db_err) => {
            StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
