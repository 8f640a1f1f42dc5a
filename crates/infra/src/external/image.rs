//! Background-removal (image transform) service client.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::http::{check_status, endpoint, parse_base_url, HttpClientBuilder, HttpError};

const SERVICE: &str = "image-service";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveBackgroundRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveBackgroundResponse {
    result_url: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundRemovalClient {
    http: Client,
    base_url: Url,
}

impl BackgroundRemovalClient {
    pub fn new(base_url: impl AsRef<str>, api_key: &str, timeout: Duration) -> Result<Self, HttpError> {
        let http = HttpClientBuilder::new()
            .timeout(timeout)
            .default_header("X-Api-Key", api_key)
            .build()?;
        Ok(Self {
            http,
            base_url: parse_base_url(base_url.as_ref())?,
        })
    }

    /// Submit an image and return the URL of the cut-out version.
    ///
    /// The service caches by source URL, so repeating a call is harmless.
    pub async fn remove_background(&self, image_url: &str) -> Result<String, HttpError> {
        let url = endpoint(SERVICE, &self.base_url, &["remove-background"])?;
        let response = self
            .http
            .post(url)
            .json(&RemoveBackgroundRequest { image_url })
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;

        let body: RemoveBackgroundResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| HttpError::from_reqwest(SERVICE, e))?;

        if body.result_url.trim().is_empty() {
            return Err(HttpError::Decode {
                service: SERVICE,
                message: "empty resultUrl".to_string(),
            });
        }
        Ok(body.result_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn handler(headers: HeaderMap, Json(body): Json<Value>) -> axum::response::Response {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("k") {
            return StatusCode::FORBIDDEN.into_response();
        }
        match body["imageUrl"].as_str() {
            Some("https://cdn.example/busy.png") => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            Some(url) => Json(json!({ "resultUrl": format!("{url}?bg=none") })).into_response(),
            None => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    async fn client(key: &str) -> BackgroundRemovalClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/remove-background", post(handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        BackgroundRemovalClient::new(format!("http://{addr}/"), key, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn returns_processed_url() {
        let url = client("k").await.remove_background("https://cdn.example/a.png").await.unwrap();
        assert_eq!(url, "https://cdn.example/a.png?bg=none");
    }

    #[tokio::test]
    async fn service_outage_is_unavailable() {
        let err = client("k")
            .await
            .remove_background("https://cdn.example/busy.png")
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn bad_key_is_rejected() {
        let err = client("wrong").await.remove_background("https://cdn.example/a.png").await.unwrap_err();
        assert!(matches!(err, HttpError::Rejected { status: 403, .. }));
    }
}
