//! Upload session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tubeferry_core::types::{ByteRange, JobId, RemoteSession};

/// Local bookkeeping for one remote resumable session.
///
/// Bound 1:1 to an active job through `job_id`; the session manager keeps
/// these keyed by job id rather than holding a reference to the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Job this session belongs to.
    pub job_id: JobId,
    /// Handle issued by the platform.
    pub remote: RemoteSession,
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// Exclusive end of the last range handed to the platform.
    pub bytes_sent: u64,
    /// Bytes the platform confirmed; lags `bytes_sent` while a chunk is in flight.
    pub bytes_acked: u64,
    /// Digest of the staged content, reused when the session is re-opened.
    pub content_digest: String,
    /// Times the transfer resumed from the platform's received range.
    pub resumes: u32,
    /// Times the session was re-opened after expiry.
    pub reopens: u32,
    /// When this session was opened.
    pub opened_at: DateTime<Utc>,
}

impl UploadSession {
    /// Start tracking a freshly opened remote session.
    pub fn new(job_id: JobId, remote: RemoteSession, chunk_size: u64, content_digest: String) -> Self {
        Self {
            job_id,
            remote,
            chunk_size,
            bytes_sent: 0,
            bytes_acked: 0,
            content_digest,
            resumes: 0,
            reopens: 0,
            opened_at: Utc::now(),
        }
    }

    /// Declared total size of the upload.
    pub fn total_size(&self) -> u64 {
        self.remote.total_size
    }

    /// The next range to send, starting at the acknowledged offset.
    pub fn next_range(&self) -> Option<ByteRange> {
        let total = self.total_size();
        if self.bytes_acked >= total {
            return None;
        }
        let len = self.chunk_size.min(total - self.bytes_acked);
        Some(ByteRange::new(self.bytes_acked, len))
    }

    /// Note that `range` was handed to the platform.
    pub fn record_sent(&mut self, range: ByteRange) {
        self.bytes_sent = self.bytes_sent.max(range.end);
    }

    /// Raise the acknowledged offset. Lower values are ignored.
    pub fn acknowledge(&mut self, offset: u64) -> bool {
        let offset = offset.min(self.total_size());
        if offset > self.bytes_acked {
            self.bytes_acked = offset;
            self.bytes_sent = self.bytes_sent.max(offset);
            true
        } else {
            false
        }
    }

    /// Swap in a re-opened remote session, keeping the local offsets.
    pub fn replace_remote(&mut self, remote: RemoteSession) {
        self.remote = remote;
        self.reopens += 1;
        self.opened_at = Utc::now();
    }

    /// Whether the platform will have forgotten the session at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remote.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(total: u64, chunk: u64) -> UploadSession {
        UploadSession::new(
            JobId::new(),
            RemoteSession {
                uri: "https://upload.example/s/1".into(),
                total_size: total,
                expires_at: Utc::now() + Duration::hours(1),
            },
            chunk,
            "digest".into(),
        )
    }

    #[test]
    fn ranges_follow_acknowledged_offset() {
        let mut s = session(25, 10);
        assert_eq!(s.next_range(), Some(ByteRange::new(0, 10)));
        s.acknowledge(10);
        assert_eq!(s.next_range(), Some(ByteRange::new(10, 10)));
        s.acknowledge(20);
        assert_eq!(s.next_range(), Some(ByteRange::new(20, 5)));
        s.acknowledge(25);
        assert_eq!(s.next_range(), None);
    }

    #[test]
    fn acknowledge_is_monotonic_and_clamped() {
        let mut s = session(25, 10);
        s.acknowledge(20);
        assert!(!s.acknowledge(10));
        assert_eq!(s.bytes_acked, 20);
        s.acknowledge(100);
        assert_eq!(s.bytes_acked, 25);
    }

    #[test]
    fn sent_may_lead_acknowledged() {
        let mut s = session(25, 10);
        s.record_sent(ByteRange::new(0, 10));
        assert_eq!(s.bytes_sent, 10);
        assert_eq!(s.bytes_acked, 0);
    }

    #[test]
    fn expiry_follows_remote_deadline() {
        let s = session(25, 10);
        assert!(!s.is_expired_at(Utc::now()));
        assert!(s.is_expired_at(Utc::now() + Duration::hours(2)));
    }
}
