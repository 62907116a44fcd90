//! Variant fetching
//!
//! A [`VariantFetcher`] performs one logical round trip for a single
//! (source, variant) pair. Whatever goes wrong is classified into a [`FetchError`];
//! fetchers never panic and never return anything the orchestrator cannot store.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::config::{RetryConfig, TransformConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use crate::types::{PreviewPayload, SourceKey, VariantId};

/// Source of transformed previews
///
/// Implementations must be cheap to call concurrently; a batch issues one call per
/// variant at the same time.
#[async_trait]
pub trait VariantFetcher: Send + Sync {
    /// Fetch one variant of the document identified by `key`
    async fn fetch(
        &self,
        key: &SourceKey,
        variant: VariantId,
    ) -> std::result::Result<PreviewPayload, FetchError>;

    /// Name of the fetcher, for logging
    fn name(&self) -> &str;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreviewRequest<'a> {
    source_key: &'a str,
    variant_id: VariantId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Fetcher backed by the transform service's `/api/preview` endpoint
pub struct HttpVariantFetcher {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
}

impl HttpVariantFetcher {
    /// Create a fetcher from the transform settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &TransformConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/preview", config.base_url.trim_end_matches('/')),
            retry: config.retry.clone(),
        })
    }

    async fn fetch_once(
        &self,
        key: &SourceKey,
        variant: VariantId,
    ) -> std::result::Result<PreviewPayload, FetchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PreviewRequest {
                source_key: key.as_str(),
                variant_id: variant,
            })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after_secs(response.headers()),
            });
        }

        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            let upstream_error = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .map(|b| b.error)
                .filter(|e| !e.trim().is_empty());
            tracing::debug!(
                source_key = %key,
                variant = %variant,
                status = status.as_u16(),
                upstream_error = upstream_error.as_deref().unwrap_or(""),
                "Transform service rejected request"
            );
            // A 5xx that explains itself is a transform failure, not a flaky hop
            return Err(match upstream_error {
                Some(message) if status.is_server_error() => FetchError::Upstream { message },
                _ => FetchError::Http {
                    status: status.as_u16(),
                },
            });
        }

        parse_payload(&body)
    }
}

#[async_trait]
impl VariantFetcher for HttpVariantFetcher {
    async fn fetch(
        &self,
        key: &SourceKey,
        variant: VariantId,
    ) -> std::result::Result<PreviewPayload, FetchError> {
        with_retry(&self.retry, || self.fetch_once(key, variant)).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// A 2xx body is either a payload or `{ "error": "..." }`
fn parse_payload(body: &[u8]) -> std::result::Result<PreviewPayload, FetchError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::upstream(format!("response is not valid JSON: {}", e)))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(FetchError::upstream(message));
    }

    serde_json::from_value(value)
        .map_err(|e| FetchError::upstream(format!("response is not a preview payload: {}", e)))
}

fn transport_error(e: &reqwest::Error) -> FetchError {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    FetchError::network(message)
}

/// Seconds to wait according to a `Retry-After` header
///
/// Accepts both the delta-seconds and the HTTP-date form.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let secs = (at.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
    Some(secs.max(0) as u64)
}
