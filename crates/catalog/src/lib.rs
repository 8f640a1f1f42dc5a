//! Catalog domain module.
//!
//! This crate contains the product catalog records that synchronization jobs
//! write, implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod product;

pub use product::{CatalogProduct, ImportedProduct, PricingMetadata, ProductStatus};
