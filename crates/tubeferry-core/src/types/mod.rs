//! Shared domain vocabulary: identifiers, job states and outcomes, byte
//! ranges, video metadata, and the shapes exchanged with remote platforms.

pub mod id;
pub mod media;
pub mod range;
pub mod remote;
pub mod state;
pub mod token;

pub use id::{AccountId, JobId, OperatorId};
pub use media::{VideoMetadata, Visibility};
pub use range::{ByteRange, SizeHint};
pub use remote::{ChunkResponse, RemoteProgress, RemoteSession, VideoId};
pub use state::{JobOutcome, JobState};
pub use token::{AccessToken, TokenGrant};
