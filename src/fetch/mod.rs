//! Single-attempt HTTP fetching for static and realtime feeds.
//!
//! There is no retry or backoff here: a failed request surfaces as a
//! [`FetchError`] and the caller decides whether to try again next cycle.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use tracing::debug;

/// Errors raised while fetching a feed over HTTP.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Issues a GET for `url` and returns the full response body.
///
/// # Errors
///
/// Returns [`FetchError::Transport`] when the request or body read fails and
/// [`FetchError::Status`] for any non-2xx response.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let parsed = url
        .parse::<reqwest::Url>()
        .map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let bytes = resp.bytes().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })?;
    debug!(url, bytes = bytes.len(), "response body received");

    Ok(bytes.to_vec())
}
