//! Service wiring: registry, orchestrator, upstream clients, catalog store
//! and one adapter per job kind.

use std::sync::{Arc, Mutex, PoisonError};

use catalogsync_infra::adapters::{CatalogImportAdapter, ImageRepublishAdapter, InventoryRefreshAdapter};
use catalogsync_infra::catalog_store::{CatalogStore, InMemoryCatalogStore, StoreError};
use catalogsync_infra::external::{BackgroundRemovalClient, HttpError, MarketplaceClient, ShopClient};
use catalogsync_infra::jobs::{spawn_eviction_sweep, InMemoryJobRegistry, Orchestrator, SweepHandle};

use crate::config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("failed to build upstream client: {0}")]
    Http(#[from] HttpError),

    #[error("failed to open catalog store: {0}")]
    Store(#[from] StoreError),

    #[error("DATABASE_URL is set but this build has no postgres support")]
    PostgresDisabled,
}

pub struct AppServices {
    pub registry: Arc<InMemoryJobRegistry>,
    pub orchestrator: Orchestrator<InMemoryJobRegistry>,
    pub catalog_import: Arc<CatalogImportAdapter>,
    pub inventory_refresh: Arc<InventoryRefreshAdapter>,
    pub image_republish: Arc<ImageRepublishAdapter>,
    sweep: Mutex<Option<SweepHandle>>,
}

impl AppServices {
    /// Stop the eviction sweep. Running jobs are left to finish on their own.
    pub async fn shutdown(&self) {
        let sweep = self.sweep.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sweep) = sweep {
            sweep.shutdown().await;
        }
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let store = open_store(config).await?;
    let timeout = config.http_timeout;

    let shop = ShopClient::new(&config.shop.base_url, &config.shop.token, timeout)?;
    let images = BackgroundRemovalClient::new(&config.image_service.base_url, &config.image_service.token, timeout)?;
    let marketplace = MarketplaceClient::new(&config.marketplace.base_url, &config.marketplace.token, timeout)?;

    let registry = Arc::new(InMemoryJobRegistry::with_retention(config.job_retention));
    let sweep = spawn_eviction_sweep(registry.clone(), config.sweep_interval);

    Ok(AppServices {
        orchestrator: Orchestrator::new(registry.clone()),
        registry,
        catalog_import: Arc::new(CatalogImportAdapter::new(shop.clone(), store.clone())),
        inventory_refresh: Arc::new(InventoryRefreshAdapter::new(shop, store.clone())),
        image_republish: Arc::new(ImageRepublishAdapter::new(images, marketplace, store)),
        sweep: Mutex::new(Some(sweep)),
    })
}

#[cfg(feature = "postgres")]
async fn open_store(config: &AppConfig) -> Result<Arc<dyn CatalogStore>, ServicesError> {
    use catalogsync_infra::catalog_store::PostgresCatalogStore;

    match &config.database_url {
        Some(url) => {
            let store = PostgresCatalogStore::connect(url).await?;
            store.ensure_schema().await?;
            tracing::info!("using postgres catalog store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryCatalogStore::new())),
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &AppConfig) -> Result<Arc<dyn CatalogStore>, ServicesError> {
    if config.database_url.is_some() {
        return Err(ServicesError::PostgresDisabled);
    }
    Ok(Arc::new(InMemoryCatalogStore::new()))
}
