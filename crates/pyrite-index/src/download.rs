//! HTTP transport helpers for index queries and artifact downloads.
//!
//! The resolver core retries nothing; transient-failure retry policy
//! belongs to whatever transport sits beneath these helpers. Failures are
//! surfaced directly as [`PyriteError::Network`], with 404 mapped to
//! `Ok(None)` so callers can distinguish "absent here" from "unreachable".

use std::time::Duration;

use reqwest::Client;

use pyrite_util::errors::{PyriteError, PyriteResult};

/// Default request timeout when the caller supplies none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a shared reqwest client honoring the caller-supplied timeout.
pub fn build_client(timeout: Duration) -> PyriteResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("pyrite/0.3")
        .build()
        .map_err(|e| PyriteError::Network {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// Fetch a JSON document. `Ok(None)` for 404.
pub async fn fetch_json(client: &Client, url: &str) -> PyriteResult<Option<serde_json::Value>> {
    match fetch_bytes(client, url).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| PyriteError::Network {
                message: format!("Invalid JSON from {url}: {e}"),
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Download raw bytes. `Ok(None)` for 404, `Network` error otherwise.
pub async fn fetch_bytes(client: &Client, url: &str) -> PyriteResult<Option<Vec<u8>>> {
    tracing::debug!(url, "fetching");
    let resp = client.get(url).send().await.map_err(|e| PyriteError::Network {
        message: format!("Request to {url} failed: {e}"),
    })?;

    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(PyriteError::Network {
            message: format!("HTTP {status} fetching {url}"),
        });
    }

    let bytes = resp.bytes().await.map_err(|e| PyriteError::Network {
        message: format!("Failed to read response from {url}: {e}"),
    })?;
    Ok(Some(bytes.to_vec()))
}
