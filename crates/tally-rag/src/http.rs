//! Shared reqwest plumbing for the upstream service clients.

use anyhow::{anyhow, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a client whose every request is bounded by `timeout`.
pub(crate) fn build_client(connect_timeout: Duration, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()?;
    Ok(client)
}

/// Send a request and decode a JSON body, classifying transport failures.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    endpoint: &str,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            tracing::error!(endpoint = %endpoint, "Request timed out");
            anyhow!("Request to {} timed out", endpoint)
        } else if e.is_connect() {
            tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
            anyhow!("Failed to connect to {}: {}", endpoint, e)
        } else {
            tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
            anyhow!("Request to {} failed: {}", endpoint, e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(300).collect();
        tracing::error!(
            endpoint = %endpoint,
            status = %status,
            error = %preview,
            "Upstream returned error"
        );
        return Err(anyhow!("{} returned HTTP {}: {}", endpoint, status, preview));
    }

    parse_json_response(response, endpoint).await
}

/// Parse a response body as JSON, returning a clear error if the server returned HTML
/// (e.g. a gateway error page) instead of valid JSON.
pub(crate) async fn parse_json_response<T: DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            anyhow!("Timed out reading response body from {}", endpoint)
        } else {
            anyhow!("Failed to read response body from {}: {}", endpoint, e)
        }
    })?;
    decode_body(&body, endpoint, status.as_u16())
}

pub(crate) fn decode_body<T: DeserializeOwned>(
    body: &str,
    endpoint: &str,
    status: u16,
) -> Result<T> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(anyhow!(
            "Endpoint {} returned HTML instead of JSON (HTTP {}). Response: {}",
            endpoint,
            status,
            preview
        ));
    }

    serde_json::from_str::<T>(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        anyhow!(
            "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
            endpoint,
            status,
            e,
            preview
        )
    })
}
