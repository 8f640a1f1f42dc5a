//! Marketplace listing client.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;

use super::http::{check_status, endpoint, parse_base_url, HttpClientBuilder, HttpError};

const SERVICE: &str = "marketplace";

#[derive(Debug, Serialize)]
struct ListingImages<'a> {
    images: [&'a str; 1],
}

#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    http: Client,
    base_url: Url,
}

impl MarketplaceClient {
    pub fn new(base_url: impl AsRef<str>, token: &str, timeout: Duration) -> Result<Self, HttpError> {
        let http = HttpClientBuilder::new()
            .timeout(timeout)
            .default_header("Authorization", format!("Bearer {token}"))
            .build()?;
        Ok(Self {
            http,
            base_url: parse_base_url(base_url.as_ref())?,
        })
    }

    /// Replace the image set of the listing for `sku`.
    ///
    /// `PUT` replaces rather than appends, so uploading the same image twice
    /// leaves one image on the listing.
    pub async fn replace_listing_image(&self, sku: &str, image_url: &str) -> Result<(), HttpError> {
        let url = endpoint(SERVICE, &self.base_url, &["listings", sku, "images"])?;
        let response = self
            .http
            .put(url)
            .json(&ListingImages { images: [image_url] })
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;

        check_status(SERVICE, response).await?;
        Ok(())
    }
}
