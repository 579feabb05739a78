use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use reelgate_core::config::ApiConfig;
use reelgate_core::models::{MediaRecord, MediaShort, MediaType};

use super::error::MetadataError;
use super::types::{Envelope, EpisodeListing};
use crate::traits::MetadataService;

/// HTTP client for the metadata API.
pub struct MetadataClient {
    base_url: Url,
    http: Client,
}

impl MetadataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| MetadataError::InvalidRequest(format!("base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(MetadataError::InvalidRequest(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reelgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url, http })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, MetadataError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{type}/{id}`
    pub fn media_url(&self, media_type: MediaType, id: &str) -> Url {
        self.endpoint(&[media_type.as_str(), id])
    }

    /// `{base}/episodes/{id}`; the season goes in the `s` query parameter.
    pub fn episodes_url(&self, id: &str) -> Url {
        self.endpoint(&["episodes", id])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, MetadataError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(MetadataError::Api {
                status,
                message: body,
            })
        }
    }

    async fn get_enveloped<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, MetadataError> {
        tracing::debug!(%url, "metadata request");
        let resp = self.http.get(url).query(query).send().await?;
        let resp = Self::check_response(resp).await?;
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| MetadataError::Parse(e.to_string()))?;
        envelope.into_payload(what)
    }
}

impl MetadataService for MetadataClient {
    type Error = MetadataError;

    async fn fetch_media(
        &self,
        media_type: MediaType,
        id: &str,
    ) -> Result<MediaRecord, MetadataError> {
        let url = self.media_url(media_type, id);
        self.get_enveloped(url, &[], &format!("{media_type}/{id}"))
            .await
    }

    async fn episode_count(&self, id: &str, season: u32) -> Result<u32, MetadataError> {
        let url = self.episodes_url(id);
        let season = season.to_string();
        let episodes: EpisodeListing = self
            .get_enveloped(url, &[("s", &season)], &format!("episodes/{id}"))
            .await?;
        u32::try_from(episodes.len())
            .map_err(|_| MetadataError::Parse("episode listing too large".into()))
    }

    async fn search(&self, query: &str) -> Result<Vec<MediaShort>, MetadataError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MetadataError::InvalidRequest("empty search query".into()));
        }
        let url = self.endpoint(&["search", "movie"]);
        self.get_enveloped(url, &[("query", query)], "search").await
    }

    async fn popular(&self) -> Result<Vec<MediaShort>, MetadataError> {
        let url = self.endpoint(&["movie", "popular"]);
        self.get_enveloped(url, &[("language", "en-US"), ("page", "1")], "popular")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MetadataClient {
        MetadataClient::new("https://meta.example/api/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let c = client();
        assert_eq!(
            c.media_url(MediaType::Movie, "603").as_str(),
            "https://meta.example/api/movie/603"
        );
        assert_eq!(
            c.media_url(MediaType::Series, "1399").as_str(),
            "https://meta.example/api/series/1399"
        );
        assert_eq!(
            c.episodes_url("1399").as_str(),
            "https://meta.example/api/episodes/1399"
        );
    }

    #[test]
    fn test_base_without_trailing_slash() {
        let c = MetadataClient::new("https://meta.example/api", Duration::from_secs(5)).unwrap();
        assert_eq!(
            c.endpoint(&["movie", "popular"]).as_str(),
            "https://meta.example/api/movie/popular"
        );
    }

    #[test]
    fn test_ids_are_encoded_in_paths() {
        assert_eq!(
            client().media_url(MediaType::Movie, "a/b c").as_str(),
            "https://meta.example/api/movie/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        for base in ["not a url", "mailto:someone@example.com"] {
            assert!(matches!(
                MetadataClient::new(base, Duration::from_secs(5)),
                Err(MetadataError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_from_config() {
        let config = reelgate_core::config::AppConfig::default();
        let c = MetadataClient::from_config(&config.api).unwrap();
        assert_eq!(c.base_url().scheme(), "http");
    }

    #[tokio::test]
    async fn test_empty_search_rejected_locally() {
        let err = client().search("   ").await.unwrap_err();
        assert!(matches!(err, MetadataError::InvalidRequest(_)));
    }
}
