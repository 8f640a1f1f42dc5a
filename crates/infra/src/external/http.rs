//! Shared HTTP plumbing for upstream clients: client construction, status
//! classification, and the mapping into adapter errors.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode, Url};

use crate::jobs::AdapterError;

/// Failure talking to an upstream service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("{service}: rate limited")]
    Throttled {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{service}: unavailable: {message}")]
    Unavailable { service: &'static str, message: String },

    #[error("{service}: rejected with {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service}: invalid response: {message}")]
    Decode { service: &'static str, message: String },

    #[error("{service}: invalid request: {message}")]
    InvalidInput { service: &'static str, message: String },

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

impl HttpError {
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return HttpError::Decode {
                service,
                message: err.to_string(),
            };
        }
        // Timeouts, refused connections and dropped bodies can all succeed later.
        HttpError::Unavailable {
            service,
            message: err.to_string(),
        }
    }
}

impl From<HttpError> for AdapterError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Throttled { retry_after, .. } => AdapterError::Throttled { retry_after },
            HttpError::Unavailable { .. } => AdapterError::transient(err.to_string()),
            HttpError::Rejected { .. } | HttpError::Decode { .. } | HttpError::InvalidInput { .. } => {
                AdapterError::item(err.to_string())
            }
            HttpError::Configuration(_) => AdapterError::catastrophic(err.to_string()),
        }
    }
}

/// Builder for upstream clients with a mandatory request timeout.
pub struct HttpClientBuilder {
    timeout: Duration,
    default_headers: HashMap<String, String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            default_headers: HashMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Client, HttpError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.default_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| HttpError::Configuration(format!("invalid header name: {key}")))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|_| HttpError::Configuration(format!("invalid value for header {key}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| HttpError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Parse a client's base URL.
pub fn parse_base_url(raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::Configuration(format!("invalid base URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(HttpError::Configuration(format!("base URL {raw:?} cannot carry a path")));
    }
    Ok(url)
}

/// Append path segments to `base`, percent-encoding each one.
///
/// Segments are taken literally: `/`, `?` and `#` inside a segment are
/// escaped, and empty or dot segments are refused.
pub fn endpoint(service: &'static str, base: &Url, segments: &[&str]) -> Result<Url, HttpError> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
        return Err(HttpError::InvalidInput {
            service,
            message: format!("invalid path segment {bad:?}"),
        });
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| HttpError::Configuration(format!("base URL {base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pass successful responses through; turn everything else into an [`HttpError`].
pub async fn check_status(service: &'static str, response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers(), Utc::now());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(service, status, retry_after, truncate(&body)))
}

/// Map a non-success status to an error class.
pub fn classify_status(
    service: &'static str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> HttpError {
    match status.as_u16() {
        429 => HttpError::Throttled { service, retry_after },
        408 | 500 | 502 | 503 | 504 => HttpError::Unavailable {
            service,
            message: format!("status {status}: {body}"),
        },
        code => HttpError::Rejected {
            service,
            status: code,
            message: body,
        },
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP date relative to `now`.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
