//! The `/watch/{id}?s=&e=&me=` navigation surface.

use url::form_urlencoded;

use crate::error::CoreError;
use crate::models::{EpisodeRef, MediaType, PlaybackRequest};

/// Where every failed load or invalid request is sent.
pub const SAFE_ROUTE: &str = "/";

/// Largest max-episodes hint accepted from a route.
pub const MAX_EPISODES_HINT: u32 = 2000;

/// A parsed watch route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoute {
    pub request: PlaybackRequest,
    /// Plausible `me` hint, cross-checked against the fetched episode count.
    pub max_episodes_hint: Option<u32>,
}

impl WatchRoute {
    pub fn movie(id: &str) -> Result<Self, CoreError> {
        Ok(Self {
            request: PlaybackRequest::movie(id)?,
            max_episodes_hint: None,
        })
    }

    pub fn series(
        id: &str,
        season: u32,
        episode: u32,
        max_episodes_hint: Option<u32>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            request: PlaybackRequest::series(id, season, episode)?,
            max_episodes_hint: max_episodes_hint.filter(|me| hint_is_plausible(*me, episode)),
        })
    }

    /// Parse the media id from the path and `s`/`e`/`me` from the query string
    /// (with or without a leading `?`).
    ///
    /// Without both `s` and `e` the route addresses a movie.
    pub fn parse(id: &str, query: &str) -> Result<Self, CoreError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut season = None;
        let mut episode = None;
        let mut max_episodes = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "s" => season = Some(value.into_owned()),
                "e" => episode = Some(value.into_owned()),
                "me" => max_episodes = Some(value.into_owned()),
                _ => {}
            }
        }

        let (Some(season), Some(episode)) = (
            season.filter(|s| !s.is_empty()),
            episode.filter(|e| !e.is_empty()),
        ) else {
            return Self::movie(id);
        };

        let season = parse_positive("s", &season)?;
        let episode = parse_positive("e", &episode)?;
        let hint = max_episodes.and_then(|me| match me.trim().parse::<u32>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::debug!(me, "ignoring unparsable max-episodes hint");
                None
            }
        });
        Self::series(id, season, episode, hint)
    }

    pub fn media_type(&self) -> MediaType {
        self.request.media_type()
    }

    /// Render as a navigable path.
    pub fn to_path(&self) -> String {
        let id = self.request.media_id();
        match self.request.episode() {
            None => format!("/watch/{id}"),
            Some(EpisodeRef { season, episode }) => {
                let mut path = format!("/watch/{id}?s={season}&e={episode}");
                if let Some(me) = self.max_episodes_hint {
                    path.push_str(&format!("&me={me}"));
                }
                path
            }
        }
    }
}

fn hint_is_plausible(max_episodes: u32, episode: u32) -> bool {
    let ok = max_episodes >= episode && max_episodes <= MAX_EPISODES_HINT;
    if !ok {
        tracing::debug!(max_episodes, episode, "discarding implausible max-episodes hint");
    }
    ok
}

fn parse_positive(key: &str, raw: &str) -> Result<u32, CoreError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(CoreError::InvalidRequest(format!(
            "query parameter {key}={raw:?} is not a positive integer"
        ))),
    }
}
