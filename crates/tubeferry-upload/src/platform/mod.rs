//! Remote video platform clients.

pub mod youtube;

pub use youtube::YouTubeClient;
