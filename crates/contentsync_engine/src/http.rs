//! HTTP bulk sink.
//!
//! Documents are written through the search engine's newline-delimited bulk
//! endpoint. The actual HTTP client is abstracted via a trait so the engine
//! does not depend on a particular HTTP library.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::sink::{BulkOutcome, DocumentSink, FailedDocument};
use contentsync_model::AggregateDocument;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Longest response excerpt kept in error messages.
const EXCERPT_CHARS: usize = 512;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true if sending the same request again cannot succeed.
    ///
    /// Client errors are permanent, except 408 and 429 which ask the caller
    /// to come back later.
    pub fn is_permanent_failure(&self) -> bool {
        (400..500).contains(&self.status) && !matches!(self.status, 408 | 429)
    }

    fn excerpt(&self) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(EXCERPT_CHARS)
            .collect()
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with an NDJSON body.
    ///
    /// Every response is returned whatever its status; `Err` means no
    /// response arrived (connection refused, timeout).
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: Option<BulkItemResult>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    error: Option<serde_json::Value>,
}

/// Bulk sink over HTTP.
///
/// Posts every batch as one bulk request to `{base_url}/_bulk`. Transport
/// failures and 5xx, 408 and 429 responses are retried with the bounded
/// [`RetryConfig`] policy; other 4xx responses fail at once.
pub struct BulkHttpSink<C: HttpClient> {
    /// Base URL of the search engine (e.g., "http://localhost:9200").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    retry: RetryConfig,
}

impl<C: HttpClient> BulkHttpSink<C> {
    /// Creates a sink with the default retry policy.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry policy for transport failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn post_with_retry(&self, url: &str, body: &[u8]) -> SyncResult<Vec<u8>> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    error = %last_error,
                    "bulk request failed, retrying in {:.2} seconds",
                    delay.as_secs_f64()
                );
                std::thread::sleep(delay);
            }
            match self.client.post(url, body.to_vec()) {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) if response.is_permanent_failure() => {
                    return Err(SyncError::Sink(format!(
                        "bulk request rejected with status {}: {}",
                        response.status,
                        response.excerpt()
                    )));
                }
                Ok(response) => {
                    last_error = format!("status {}: {}", response.status, response.excerpt());
                }
                Err(e) => last_error = e,
            }
        }

        Err(SyncError::transport_retryable(format!(
            "bulk request failed after {attempts} attempts: {last_error}"
        )))
    }
}

/// Renders the bulk request body: an action line and a source line per
/// document.
fn bulk_body(index: &str, documents: &[AggregateDocument]) -> SyncResult<Vec<u8>> {
    let encode_error =
        |e: serde_json::Error| SyncError::Sink(format!("failed to encode document: {e}"));
    let mut body = Vec::new();
    for document in documents {
        let action = json!({"index": {"_index": index, "_id": document.id}});
        serde_json::to_writer(&mut body, &action).map_err(encode_error)?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, document).map_err(encode_error)?;
        body.push(b'\n');
    }
    Ok(body)
}

fn parse_outcome(response: &[u8], documents: &[AggregateDocument]) -> SyncResult<BulkOutcome> {
    let response: BulkResponse = serde_json::from_slice(response)
        .map_err(|e| SyncError::Sink(format!("invalid bulk response: {e}")))?;

    if !response.errors {
        return Ok(BulkOutcome {
            indexed: documents.len(),
            failed: Vec::new(),
        });
    }

    let mut outcome = BulkOutcome::default();
    let mut reported = HashSet::new();
    for (position, item) in response.items.into_iter().enumerate() {
        let Some(result) = item.index else {
            continue;
        };
        let id = result
            .id
            .or_else(|| documents.get(position).map(|d| d.id.clone()))
            .unwrap_or_default();
        reported.insert(id.clone());

        let failed = result.error.is_some() || result.status >= 300;
        if !failed {
            outcome.indexed += 1;
            continue;
        }
        let reason = match result.error {
            Some(error) => error
                .get("reason")
                .and_then(|r| r.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            None => format!("status {}", result.status),
        };
        outcome.failed.push(FailedDocument { id, reason });
    }

    // With errors reported, only per-item results confirm a write.
    for document in documents {
        if !reported.contains(&document.id) {
            outcome.failed.push(FailedDocument {
                id: document.id.clone(),
                reason: "no result in bulk response".to_string(),
            });
        }
    }
    Ok(outcome)
}

impl<C: HttpClient> DocumentSink for BulkHttpSink<C> {
    fn bulk_index(&self, index: &str, documents: &[AggregateDocument]) -> SyncResult<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = bulk_body(index, documents)?;
        let url = format!("{}/_bulk", self.base_url);
        debug!(index, documents = documents.len(), bytes = body.len(), "posting bulk request");

        let response = self.post_with_retry(&url, &body)?;
        parse_outcome(&response, documents)
    }
}
