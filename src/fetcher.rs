//! HTTP range fetching
//!
//! A [`RangeFetcher`] issues one GET per attempt, optionally resuming at a
//! byte offset, and hands back the status, the advertised length and the body
//! as a stream of chunks. Status interpretation is left to the engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::RANGE;

use crate::error::TransferError;

/// Response head plus a streaming body
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Length` of this response (the remaining bytes for a ranged request)
    pub content_length: Option<u64>,
    /// Body chunks; a transport failure mid-body surfaces as an `Err` item
    pub body: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Whether the status is in the 2xx range (206 included)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues HTTP GETs with an optional `Range: bytes=<offset>-` header
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Start a request; `offset` of `None` means a plain GET
    async fn fetch(&self, url: &str, offset: Option<u64>) -> Result<FetchResponse, TransferError>;
}

/// [`RangeFetcher`] backed by a shared `reqwest::Client`
#[derive(Clone, Debug, Default)]
pub struct HttpRangeFetcher {
    client: reqwest::Client,
}

impl HttpRangeFetcher {
    /// Create a fetcher with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher reusing an existing client (proxy, TLS and timeout
    /// settings come from the client)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch(&self, url: &str, offset: Option<u64>) -> Result<FetchResponse, TransferError> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        tracing::debug!(url, ?offset, status, ?content_length, "Response received");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        Ok(FetchResponse {
            status,
            content_length,
            body,
        })
    }
}
