//! Synchronization adapters: one per job kind.
//!
//! Each adapter performs the external calls for a single item, persists the
//! result to the catalog store, and reports failures in the adapter error
//! taxonomy. All of them are idempotent, so the worker pool may retry any
//! transient failure.

pub mod catalog_import;
pub mod image_republish;
pub mod inventory_refresh;

pub use catalog_import::{CatalogImportAdapter, CatalogImportItem};
pub use image_republish::{ImageRepublishAdapter, ImageRepublishItem};
pub use inventory_refresh::{InventoryRefreshAdapter, InventoryRefreshItem};
