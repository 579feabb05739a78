//! Trait definition for the metadata collaborator.
//!
//! The CLI drives the playback view through this trait, so tests and
//! alternative backends can stand in for the HTTP client.

use std::future::Future;

use reelgate_core::models::{MediaRecord, MediaShort, MediaType};

/// Read-only access to media metadata.
pub trait MetadataService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the detail record for a movie or series.
    fn fetch_media(
        &self,
        media_type: MediaType,
        id: &str,
    ) -> impl Future<Output = Result<MediaRecord, Self::Error>> + Send;

    /// Number of episodes in `season` of series `id`.
    fn episode_count(
        &self,
        id: &str,
        season: u32,
    ) -> impl Future<Output = Result<u32, Self::Error>> + Send;

    /// Search titles by free text.
    fn search(&self, query: &str)
        -> impl Future<Output = Result<Vec<MediaShort>, Self::Error>> + Send;

    /// Currently popular movies.
    fn popular(&self) -> impl Future<Output = Result<Vec<MediaShort>, Self::Error>> + Send;
}
