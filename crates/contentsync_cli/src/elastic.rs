//! Blocking HTTP client for the search engine's bulk endpoint.

use crate::error::{CliError, CliResult};
use contentsync_engine::{HttpClient, HttpResponse};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// [`HttpClient`] backed by `reqwest`.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Creates a client with a request timeout.
    pub fn new(timeout: Duration) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::client("http", e))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, bytes.to_vec()))
    }
}
