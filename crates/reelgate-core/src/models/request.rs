use serde::{Deserialize, Serialize};

use super::MediaType;
use crate::error::CoreError;

/// Upper bound on identifier length accepted from routes.
const MAX_ID_LEN: usize = 64;

/// A season/episode coordinate. Both parts are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeRef {
    pub fn new(season: u32, episode: u32) -> Result<Self, CoreError> {
        if season == 0 || episode == 0 {
            return Err(CoreError::InvalidRequest(format!(
                "season and episode must be at least 1 (got S{season} E{episode})"
            )));
        }
        Ok(Self { season, episode })
    }

    /// The following episode in the same season.
    pub fn next(&self) -> Self {
        Self {
            season: self.season,
            episode: self.episode + 1,
        }
    }
}

/// Identity of what to play. Only constructed through the validating
/// constructors, so a series request always carries an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    media_id: String,
    episode: Option<EpisodeRef>,
}

impl PlaybackRequest {
    pub fn movie(media_id: &str) -> Result<Self, CoreError> {
        Ok(Self {
            media_id: validate_media_id(media_id)?,
            episode: None,
        })
    }

    pub fn series(media_id: &str, season: u32, episode: u32) -> Result<Self, CoreError> {
        Ok(Self {
            media_id: validate_media_id(media_id)?,
            episode: Some(EpisodeRef::new(season, episode)?),
        })
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn media_type(&self) -> MediaType {
        if self.episode.is_some() {
            MediaType::Series
        } else {
            MediaType::Movie
        }
    }

    pub fn episode(&self) -> Option<EpisodeRef> {
        self.episode
    }
}

/// Ids are interpolated into URLs, so only a conservative charset is allowed.
fn validate_media_id(id: &str) -> Result<String, CoreError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CoreError::InvalidRequest("media id is empty".into()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::InvalidRequest(format!(
            "media id longer than {MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidRequest(format!(
            "media id contains invalid characters: {id:?}"
        )));
    }
    Ok(id.to_string())
}
