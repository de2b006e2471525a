//! Size-checked source byte stream.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use tubeferry_core::error::AppError;
use tubeferry_core::result::AppResult;
use tubeferry_core::types::SizeHint;

/// Boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = AppResult<Bytes>> + Send>>;

/// An opened source: a body plus what is known about its length.
///
/// Every chunk passes through [`SourceStream::next_chunk`], which enforces
/// the size limit, the declared length and the stall timeout.
pub struct SourceStream {
    /// Size announced before the first byte.
    size: SizeHint,
    /// Body chunks.
    body: BodyStream,
    /// Largest accepted source.
    max_bytes: u64,
    /// Longest wait for the next chunk.
    read_timeout: Duration,
    /// Bytes yielded so far.
    received: u64,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("size", &self.size)
            .field("max_bytes", &self.max_bytes)
            .field("received", &self.received)
            .finish()
    }
}

impl SourceStream {
    /// Wrap a body stream.
    ///
    /// Fails with `SourceTooLarge` up front when the announced size is over
    /// the limit.
    pub fn new(
        size: SizeHint,
        body: BodyStream,
        max_bytes: u64,
        read_timeout: Duration,
    ) -> AppResult<Self> {
        if let SizeHint::Exact(n) = size {
            if n > max_bytes {
                return Err(AppError::source_too_large(format!(
                    "source is {n} bytes, limit is {max_bytes}"
                )));
            }
        }
        Ok(Self {
            size,
            body,
            max_bytes,
            read_timeout,
            received: 0,
        })
    }

    /// Wrap a `reqwest` byte stream.
    pub fn from_response(
        response: reqwest::Response,
        max_bytes: u64,
        read_timeout: Duration,
    ) -> AppResult<Self> {
        let size = SizeHint::from(response.content_length());
        let body = response.bytes_stream().map(|r| r.map_err(AppError::from));
        Self::new(size, Box::pin(body), max_bytes, read_timeout)
    }

    /// Size announced by the source.
    pub fn size(&self) -> SizeHint {
        self.size
    }

    /// Bytes received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Next chunk of the body, `None` at a clean end.
    ///
    /// A stall longer than the read timeout or a body shorter than its
    /// announced length is `NetworkTransient`; crossing the size limit or
    /// the announced length is `SourceTooLarge`.
    pub async fn next_chunk(&mut self) -> AppResult<Option<Bytes>> {
        let next = tokio::time::timeout(self.read_timeout, self.body.next())
            .await
            .map_err(|_| {
                AppError::network(format!(
                    "source stalled for {}s after {} bytes",
                    self.read_timeout.as_secs(),
                    self.received
                ))
            })?;

        match next {
            None => {
                if let SizeHint::Exact(n) = self.size {
                    if self.received < n {
                        return Err(AppError::network(format!(
                            "source ended after {} of {n} bytes",
                            self.received
                        )));
                    }
                }
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            Some(Ok(chunk)) => {
                self.received += chunk.len() as u64;
                if self.received > self.max_bytes {
                    return Err(AppError::source_too_large(format!(
                        "source exceeded the {}-byte limit",
                        self.max_bytes
                    )));
                }
                if let SizeHint::Exact(n) = self.size {
                    if self.received > n {
                        return Err(AppError::source_too_large(format!(
                            "source sent more than its announced {n} bytes"
                        )));
                    }
                }
                Ok(Some(chunk))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tubeferry_core::ErrorKind;

    fn body(chunks: Vec<&'static [u8]>) -> BodyStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    async fn drain(mut s: SourceStream) -> AppResult<u64> {
        while s.next_chunk().await?.is_some() {}
        Ok(s.received())
    }

    #[tokio::test]
    async fn passes_through_within_limits() {
        let s = SourceStream::new(
            SizeHint::Exact(6),
            body(vec![&b"abc"[..], &b"def"[..]]),
            10,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(drain(s).await.unwrap(), 6);
    }

    #[test]
    fn announced_size_over_limit_fails_before_reading() {
        let err = SourceStream::new(
            SizeHint::Exact(11),
            body(vec![]),
            10,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceTooLarge);
    }

    #[tokio::test]
    async fn unknown_length_over_limit_fails_mid_stream() {
        let s = SourceStream::new(
            SizeHint::Unknown,
            body(vec![&b"abcdef"[..], &b"ghijkl"[..]]),
            10,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(drain(s).await.unwrap_err().kind, ErrorKind::SourceTooLarge);
    }

    #[tokio::test]
    async fn short_body_is_transient() {
        let s = SourceStream::new(
            SizeHint::Exact(10),
            body(vec![&b"abc"[..]]),
            100,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(drain(s).await.unwrap_err().kind, ErrorKind::NetworkTransient);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out() {
        let s = SourceStream::new(
            SizeHint::Unknown,
            Box::pin(stream::pending::<AppResult<Bytes>>()),
            100,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(drain(s).await.unwrap_err().kind, ErrorKind::NetworkTransient);
    }
}
