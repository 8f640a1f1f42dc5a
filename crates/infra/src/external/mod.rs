//! Clients for the third-party services jobs synchronize with.
//!
//! Every client has a request timeout and reports failures as [`HttpError`],
//! which converts into the adapter error taxonomy.

pub mod http;
pub mod image;
pub mod marketplace;
pub mod shop;

pub use http::{HttpClientBuilder, HttpError};
pub use image::BackgroundRemovalClient;
pub use marketplace::MarketplaceClient;
pub use shop::{InventoryLevel, ShopClient};
