//! Fetcher wrappers for fault injection over real HTTP

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use ota_dl::{HttpRangeFetcher, RangeFetcher, TransferError};
use ota_dl::fetcher::FetchResponse;

/// Real HTTP fetcher whose first response body breaks off after `drop_at` bytes
///
/// Mid-body connection resets are hard to provoke from a mock server, so the
/// fault is injected on the client side while the requests themselves
/// (including the `Range` header) still go over the wire.
pub struct DropOnceFetcher {
    inner: HttpRangeFetcher,
    drop_at: u64,
    dropped: AtomicBool,
}

impl DropOnceFetcher {
    pub fn new(drop_at: u64) -> Self {
        Self {
            inner: HttpRangeFetcher::new(),
            drop_at,
            dropped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RangeFetcher for DropOnceFetcher {
    async fn fetch(&self, url: &str, offset: Option<u64>) -> Result<FetchResponse, TransferError> {
        let mut response = self.inner.fetch(url, offset).await?;
        if !self.dropped.swap(true, Ordering::SeqCst) {
            response.body = cut_after(response.body, self.drop_at);
        }
        Ok(response)
    }
}

type Body = BoxStream<'static, Result<Bytes, TransferError>>;

/// Pass `limit` bytes through, then fail like a reset connection
fn cut_after(body: Body, limit: u64) -> Body {
    stream::unfold(Some((body, 0u64)), move |state| async move {
        let (mut body, seen) = state?;
        match body.next().await {
            Some(Ok(chunk)) => {
                let len = chunk.len() as u64;
                if seen + len < limit {
                    return Some((vec![Ok(chunk)], Some((body, seen + len))));
                }
                let kept = chunk.slice(..(limit - seen) as usize);
                let reset = Err(TransferError::Network("connection reset by peer".into()));
                Some((vec![Ok(kept), reset], None))
            }
            Some(Err(e)) => Some((vec![Err(e)], None)),
            None => None,
        }
    })
    .flat_map(stream::iter)
    .boxed()
}
