//! Byte ranges and size hints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A contiguous, half-open byte range `[start, end)` within an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// One past the last byte offset (exclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range covering `len` bytes starting at `start`.
    pub fn new(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Inclusive last byte offset, as used in `Content-Range` headers.
    ///
    /// Only meaningful for non-empty ranges.
    pub fn last(&self) -> u64 {
        self.end.saturating_sub(1)
    }

    /// Render as an HTTP `Content-Range` value for a body of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.last(), total)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// What is known about a source's total size before it is fully fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bytes", rename_all = "lowercase")]
pub enum SizeHint {
    /// The exact size is known (e.g. from `Content-Length`).
    Exact(u64),
    /// The size will only be known once the stream ends.
    Unknown,
}

impl SizeHint {
    /// Return the exact size if known.
    pub fn exact(&self) -> Option<u64> {
        match self {
            Self::Exact(n) => Some(*n),
            Self::Unknown => None,
        }
    }
}

impl From<Option<u64>> for SizeHint {
    fn from(value: Option<u64>) -> Self {
        value.map(Self::Exact).unwrap_or(Self::Unknown)
    }
}
