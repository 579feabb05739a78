//! Playback view state machine.
//!
//! A view moves `Loading -> Idle` once metadata (and, for series, the episode
//! count) has arrived, or `Loading -> Error` on any failure. Every `open`
//! starts a new generation; fetch results tagged with an older generation are
//! dropped, so a slow response for a page the user already left cannot
//! overwrite the current one.

use std::sync::Arc;

use crate::adstrip::{self, EmbeddedDocument};
use crate::error::CoreError;
use crate::history::ViewedEntry;
use crate::models::{MediaRecord, MediaType, PlaybackRequest};
use crate::providers::{Provider, ProviderRegistry};
use crate::resolver;
use crate::route::{WatchRoute, SAFE_ROUTE};
use crate::storage::{KeyValueStore, PersistedState};

/// Load generation counter.
pub type Generation = u64;

/// Fetches the caller must perform for a freshly opened route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: Generation,
    pub media_type: MediaType,
    pub media_id: String,
    /// Season whose episode count must be fetched; set for every series.
    pub episode_count_season: Option<u32>,
}

/// Coarse view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Idle,
    Error,
}

#[derive(Debug, Clone)]
struct Pending {
    route: WatchRoute,
    record: Option<MediaRecord>,
    max_episodes: Option<u32>,
}

#[derive(Debug, Clone)]
struct Ready {
    request: PlaybackRequest,
    record: MediaRecord,
    max_episodes: Option<u32>,
}

#[derive(Debug, Clone)]
enum ViewState {
    Blank,
    Loading(Pending),
    Idle(Ready),
    Error {
        request: Option<PlaybackRequest>,
        reason: String,
    },
}

/// Messages handled by the playback view.
#[derive(Debug, Clone)]
pub enum Message {
    MetadataLoaded {
        generation: Generation,
        result: Result<MediaRecord, String>,
    },
    EpisodeCountLoaded {
        generation: Generation,
        result: Result<u32, String>,
    },
    ProviderSelected(String),
    NextEpisode,
    Back,
}

/// What the host should do after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    /// The message belonged to a superseded load and was ignored.
    Stale,
    /// Point the embed frame at this URL.
    Embed(String),
    /// Navigate to another route inside the app.
    NavigateTo(String),
    /// Leave the view for a safe route.
    Redirect { to: &'static str, reason: String },
}

/// Playback view: owns transient state, reads and writes persisted state.
pub struct WatchView<S> {
    registry: Arc<ProviderRegistry>,
    persisted: PersistedState<S>,
    ad_markers: Vec<String>,
    generation: Generation,
    state: ViewState,
}

impl<S: KeyValueStore> WatchView<S> {
    pub fn new(registry: Arc<ProviderRegistry>, store: S, ad_markers: Vec<String>) -> Self {
        Self {
            registry,
            persisted: PersistedState::new(store),
            ad_markers,
            generation: 0,
            state: ViewState::Blank,
        }
    }

    pub fn persisted(&self) -> &PersistedState<S> {
        &self.persisted
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            ViewState::Blank | ViewState::Loading(_) => Phase::Loading,
            ViewState::Idle(_) => Phase::Idle,
            ViewState::Error { .. } => Phase::Error,
        }
    }

    /// Why the view is in `Error`, if it is.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ViewState::Error { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Parse route parameters and open them. A malformed route puts the view
    /// in `Error`; the caller should redirect to [`SAFE_ROUTE`].
    pub fn open_query(&mut self, id: &str, query: &str) -> Result<LoadTicket, CoreError> {
        match WatchRoute::parse(id, query) {
            Ok(route) => self.open(route),
            Err(e) => {
                self.generation += 1;
                self.fail(None, &e);
                Err(e)
            }
        }
    }

    /// Start loading `route`. Series routes overwrite the continue bookmark.
    ///
    /// The episode count is always fetched for series; a `me` hint from the
    /// route is only checked against it.
    pub fn open(&mut self, route: WatchRoute) -> Result<LoadTicket, CoreError> {
        self.generation += 1;
        let request = &route.request;

        if let Some(episode) = request.episode() {
            if let Err(e) = self.persisted.save_bookmark(request.media_id(), episode) {
                self.fail(Some(request.clone()), &e);
                return Err(e);
            }
        }

        let ticket = LoadTicket {
            generation: self.generation,
            media_type: request.media_type(),
            media_id: request.media_id().to_string(),
            episode_count_season: request.episode().map(|ep| ep.season),
        };

        tracing::info!(
            generation = self.generation,
            route = %route.to_path(),
            "opening watch route"
        );
        self.state = ViewState::Loading(Pending {
            route,
            record: None,
            max_episodes: None,
        });
        Ok(ticket)
    }

    pub fn update(&mut self, msg: Message) -> Action {
        match msg {
            Message::MetadataLoaded { generation, result } => {
                let Some(pending) = self.pending_for(generation) else {
                    return Action::Stale;
                };
                match result {
                    Ok(record) => {
                        pending.record = Some(record);
                        self.try_finish()
                    }
                    Err(e) => self.fetch_failed("metadata", e),
                }
            }
            Message::EpisodeCountLoaded { generation, result } => {
                let Some(pending) = self.pending_for(generation) else {
                    return Action::Stale;
                };
                match result {
                    Ok(count) => {
                        pending.max_episodes = Some(count);
                        self.try_finish()
                    }
                    Err(e) => self.fetch_failed("episode count", e),
                }
            }
            Message::ProviderSelected(name) => match self.persisted.select_provider(&self.registry, &name) {
                Ok(provider) => {
                    tracing::info!(provider = %provider.name, "provider selected");
                    self.embed_url().map_or(Action::None, Action::Embed)
                }
                Err(e) => {
                    tracing::warn!("could not persist provider selection: {e}");
                    self.embed_url().map_or(Action::None, Action::Embed)
                }
            },
            Message::NextEpisode => self
                .next_episode()
                .map_or(Action::None, |route| Action::NavigateTo(route.to_path())),
            Message::Back => self.back_path().map_or(
                Action::NavigateTo(SAFE_ROUTE.to_string()),
                Action::NavigateTo,
            ),
        }
    }

    /// The provider currently in effect.
    pub fn selected_provider(&self) -> &Provider {
        match self.persisted.selected_provider(&self.registry) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!("could not read provider selection: {e}");
                self.registry.default_provider()
            }
        }
    }

    /// Freshly resolved embed URL; only available while `Idle`.
    pub fn embed_url(&self) -> Option<String> {
        let ViewState::Idle(ready) = &self.state else {
            return None;
        };
        Some(resolver::resolve(&ready.request, self.selected_provider()))
    }

    /// True exactly when a series is playing and `episode < max_episodes`.
    pub fn can_advance(&self) -> bool {
        self.next_episode().is_some()
    }

    /// Route for the following episode, carrying the known episode count.
    pub fn next_episode(&self) -> Option<WatchRoute> {
        let ViewState::Idle(ready) = &self.state else {
            return None;
        };
        let current = ready.request.episode()?;
        let max = ready.max_episodes?;
        if current.episode >= max {
            return None;
        }
        let next = current.next();
        WatchRoute::series(
            ready.request.media_id(),
            next.season,
            next.episode,
            Some(max),
        )
        .ok()
    }

    /// Detail page for the current media.
    pub fn back_path(&self) -> Option<String> {
        let request = self.current_request()?;
        Some(format!("/{}/{}", request.media_type(), request.media_id()))
    }

    /// Page title: the media title (or "Watch") plus `S{n} E{n}` for series.
    pub fn title(&self) -> String {
        let record_title = match &self.state {
            ViewState::Idle(ready) => Some(ready.record.title.as_str()),
            ViewState::Loading(pending) => pending.record.as_ref().map(|r| r.title.as_str()),
            _ => None,
        };
        let mut title = record_title.unwrap_or("Watch").to_string();
        if let Some(ep) = self.current_request().and_then(|r| r.episode()) {
            title.push_str(&format!(" S{} E{}", ep.season, ep.episode));
        }
        title
    }

    /// Post-load hook for the embed frame. Never fails; returns how many ad
    /// elements were removed.
    pub fn on_embed_loaded(&self, document: Option<&mut dyn EmbeddedDocument>) -> usize {
        if self.phase() != Phase::Idle {
            return 0;
        }
        adstrip::strip_ads(document, &self.ad_markers)
    }

    fn current_request(&self) -> Option<&PlaybackRequest> {
        match &self.state {
            ViewState::Blank => None,
            ViewState::Loading(pending) => Some(&pending.route.request),
            ViewState::Idle(ready) => Some(&ready.request),
            ViewState::Error { request, .. } => request.as_ref(),
        }
    }

    fn pending_for(&mut self, generation: Generation) -> Option<&mut Pending> {
        let current = self.generation;
        match &mut self.state {
            ViewState::Loading(pending) if generation == current => Some(pending),
            _ => {
                tracing::debug!(generation, current, "dropping stale load result");
                None
            }
        }
    }

    fn fetch_failed(&mut self, what: &str, error: String) -> Action {
        let err = CoreError::FetchFailed(format!("{what}: {error}"));
        let request = self.current_request().cloned();
        self.fail(request, &err)
    }

    fn fail(&mut self, request: Option<PlaybackRequest>, err: &CoreError) -> Action {
        tracing::warn!(generation = self.generation, "watch view failed: {err}");
        let reason = err.to_string();
        self.state = ViewState::Error {
            request,
            reason: reason.clone(),
        };
        Action::Redirect {
            to: SAFE_ROUTE,
            reason,
        }
    }

    /// Move to `Idle` once everything the route needs has arrived.
    fn try_finish(&mut self) -> Action {
        let ViewState::Loading(pending) = &self.state else {
            return Action::None;
        };
        let Some(record) = &pending.record else {
            return Action::None;
        };
        let request = pending.route.request.clone();
        let media_type = request.media_type();

        if let Some(ep) = request.episode() {
            if let Some(seasons) = record.seasons {
                if ep.season > seasons {
                    let err = CoreError::InvalidRequest(format!(
                        "season {} exceeds {} available",
                        ep.season, seasons
                    ));
                    return self.fail(Some(request), &err);
                }
            }
            let Some(max_episodes) = pending.max_episodes else {
                return Action::None;
            };
            if ep.episode > max_episodes {
                let err = CoreError::InvalidRequest(format!(
                    "episode {} exceeds {} available",
                    ep.episode, max_episodes
                ));
                return self.fail(Some(request), &err);
            }
            if let Some(hint) = pending.route.max_episodes_hint {
                if hint > max_episodes {
                    let err = CoreError::InvalidRequest(format!(
                        "route claims {hint} episodes, season has {max_episodes}"
                    ));
                    return self.fail(Some(request), &err);
                }
            }
        }

        let record = record.clone();
        let max_episodes = match media_type {
            MediaType::Series => pending.max_episodes,
            MediaType::Movie => None,
        };
        if let Err(e) = self
            .persisted
            .record_viewed(ViewedEntry::from_record(&record, media_type))
        {
            tracing::warn!("could not record viewed entry: {e}");
        }

        tracing::info!(generation = self.generation, title = %record.title, "watch view ready");
        self.state = ViewState::Idle(Ready {
            request,
            record,
            max_episodes,
        });
        self.embed_url().map_or(Action::None, Action::Embed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adstrip::DocumentAccessError;
    use crate::storage::{MemoryStore, SELECTED_SOURCE_KEY, VIEWED_KEY};

    fn view() -> WatchView<MemoryStore> {
        WatchView::new(
            Arc::new(ProviderRegistry::embedded()),
            MemoryStore::new(),
            vec![".ad-class".into()],
        )
    }

    fn matrix() -> MediaRecord {
        serde_json::from_str(r#"{"id": 603, "title": "The Matrix", "images": {"poster": "/m.jpg"}}"#)
            .unwrap()
    }

    fn thrones() -> MediaRecord {
        serde_json::from_str(r#"{"id": 1399, "title": "Game of Thrones", "seasons": 8}"#).unwrap()
    }

    fn loaded(generation: Generation, record: MediaRecord) -> Message {
        Message::MetadataLoaded {
            generation,
            result: Ok(record),
        }
    }

    fn counted(generation: Generation, count: u32) -> Message {
        Message::EpisodeCountLoaded {
            generation,
            result: Ok(count),
        }
    }

    #[test]
    fn test_movie_flow() {
        let mut v = view();
        let ticket = v.open_query("603", "").unwrap();
        assert_eq!(ticket.media_type, MediaType::Movie);
        assert_eq!(ticket.episode_count_season, None);
        assert_eq!(v.phase(), Phase::Loading);
        assert_eq!(v.embed_url(), None);
        assert_eq!(v.title(), "Watch");

        let action = v.update(loaded(ticket.generation, matrix()));
        assert_eq!(
            action,
            Action::Embed("https://vidsrc.pro/embed/movie/603?autoplay=1&theme=ff2222".into())
        );
        assert_eq!(v.phase(), Phase::Idle);
        assert_eq!(v.title(), "The Matrix");
        assert!(!v.can_advance());
        assert_eq!(v.back_path().as_deref(), Some("/movie/603"));

        let viewed = v.persisted().viewed().unwrap();
        assert_eq!(viewed.entries()[0].id, "603");
        assert_eq!(viewed.entries()[0].poster_path.as_deref(), Some("/m.jpg"));
    }

    #[test]
    fn test_series_waits_for_episode_count() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=2&e=5").unwrap();
        assert_eq!(ticket.episode_count_season, Some(2));

        assert_eq!(v.update(loaded(ticket.generation, thrones())), Action::None);
        assert_eq!(v.phase(), Phase::Loading);
        assert_eq!(v.title(), "Game of Thrones S2 E5");

        let action = v.update(counted(ticket.generation, 10));
        assert_eq!(
            action,
            Action::Embed("https://vidsrc.pro/embed/tv/1399/2/5?autoplay=1&theme=ff2222".into())
        );
        assert!(v.can_advance());
        assert_eq!(
            v.update(Message::NextEpisode),
            Action::NavigateTo("/watch/1399?s=2&e=6&me=10".into())
        );
    }

    #[test]
    fn test_series_bookmark_written_on_open() {
        let mut v = view();
        v.open_query("1399", "s=3&e=4&me=10").unwrap();
        let bookmark = v.persisted().bookmark("1399").unwrap().unwrap();
        assert_eq!((bookmark.season, bookmark.episode), (3, 4));
    }

    #[test]
    fn test_hint_does_not_skip_episode_count() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=1&e=10&me=10").unwrap();
        assert_eq!(ticket.episode_count_season, Some(1));
        assert_eq!(v.update(loaded(ticket.generation, thrones())), Action::None);
        assert!(matches!(
            v.update(counted(ticket.generation, 10)),
            Action::Embed(_)
        ));
        // Last episode: the advance control is absent.
        assert!(!v.can_advance());
        assert_eq!(v.update(Message::NextEpisode), Action::None);
    }

    #[test]
    fn test_inflated_hint_cannot_reach_resolver() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=1&e=500&me=2000").unwrap();
        assert_eq!(ticket.episode_count_season, Some(1));
        assert_eq!(v.update(loaded(ticket.generation, thrones())), Action::None);
        assert_eq!(v.embed_url(), None);

        let action = v.update(counted(ticket.generation, 10));
        assert!(matches!(action, Action::Redirect { to: "/", .. }));
        assert_eq!(v.phase(), Phase::Error);
        assert!(!v.can_advance());
    }

    #[test]
    fn test_hint_larger_than_season_redirects() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=1&e=3&me=40").unwrap();
        v.update(loaded(ticket.generation, thrones()));
        let action = v.update(counted(ticket.generation, 10));
        assert!(matches!(action, Action::Redirect { .. }));
        assert_eq!(v.embed_url(), None);
    }

    #[test]
    fn test_advance_absent_exactly_at_max() {
        for (episode, max, expected) in [(1, 3, true), (2, 3, true), (3, 3, false)] {
            let mut v = view();
            let ticket = v
                .open(WatchRoute::series("1399", 1, episode, Some(max)).unwrap())
                .unwrap();
            v.update(loaded(ticket.generation, thrones()));
            v.update(counted(ticket.generation, max));
            assert_eq!(v.can_advance(), expected, "episode {episode} of {max}");
        }
    }

    #[test]
    fn test_stale_results_are_dropped() {
        let mut v = view();
        let first = v.open_query("603", "").unwrap();
        let second = v.open_query("1399", "s=1&e=1&me=5").unwrap();
        assert!(second.generation > first.generation);

        // The superseded movie fetch resolves late.
        assert_eq!(v.update(loaded(first.generation, matrix())), Action::Stale);
        assert_eq!(v.phase(), Phase::Loading);

        v.update(loaded(second.generation, thrones()));
        assert!(matches!(
            v.update(counted(second.generation, 5)),
            Action::Embed(_)
        ));
        assert_eq!(v.title(), "Game of Thrones S1 E1");
        // Only the current load reached the viewed list.
        let viewed = v.persisted().viewed().unwrap();
        assert_eq!(viewed.len(), 1);
        assert_eq!(viewed.entries()[0].id, "1399");
    }

    #[test]
    fn test_late_failure_from_old_generation_is_ignored() {
        let mut v = view();
        let first = v.open_query("603", "").unwrap();
        let second = v.open_query("603", "").unwrap();
        v.update(loaded(second.generation, matrix()));
        let action = v.update(Message::MetadataLoaded {
            generation: first.generation,
            result: Err("timeout".into()),
        });
        assert_eq!(action, Action::Stale);
        assert_eq!(v.phase(), Phase::Idle);
    }

    #[test]
    fn test_results_after_idle_are_stale() {
        let mut v = view();
        let ticket = v.open_query("603", "").unwrap();
        v.update(loaded(ticket.generation, matrix()));
        assert_eq!(v.update(loaded(ticket.generation, matrix())), Action::Stale);
    }

    #[test]
    fn test_fetch_failure_redirects() {
        let mut v = view();
        let ticket = v.open_query("603", "").unwrap();
        let action = v.update(Message::MetadataLoaded {
            generation: ticket.generation,
            result: Err("HTTP 500".into()),
        });
        assert!(matches!(action, Action::Redirect { to: "/", .. }));
        assert_eq!(v.phase(), Phase::Error);
        assert_eq!(v.embed_url(), None);
        assert!(v.error().unwrap().contains("HTTP 500"));
    }

    #[test]
    fn test_episode_count_failure_redirects() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=1&e=1").unwrap();
        let action = v.update(Message::EpisodeCountLoaded {
            generation: ticket.generation,
            result: Err("not found".into()),
        });
        assert!(matches!(action, Action::Redirect { .. }));
        // Metadata arriving afterwards cannot revive the view.
        assert_eq!(v.update(loaded(ticket.generation, thrones())), Action::Stale);
    }

    #[test]
    fn test_out_of_range_requests_redirect() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=9&e=1&me=10").unwrap();
        let action = v.update(loaded(ticket.generation, thrones()));
        assert!(matches!(action, Action::Redirect { .. }));

        let ticket = v.open_query("1399", "s=1&e=11").unwrap();
        v.update(loaded(ticket.generation, thrones()));
        let action = v.update(counted(ticket.generation, 10));
        assert!(matches!(action, Action::Redirect { .. }));
        assert!(v.persisted().viewed().unwrap().is_empty());
    }

    /// Store whose bookmark writes fail.
    struct FullDiskStore(MemoryStore);

    impl KeyValueStore for FullDiskStore {
        fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
            if key.starts_with("continue_") {
                return Err(CoreError::Io(std::io::Error::other("disk full")));
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), CoreError> {
            self.0.remove(key)
        }
    }

    #[test]
    fn test_failed_open_clears_previous_title() {
        let mut v = WatchView::new(
            Arc::new(ProviderRegistry::embedded()),
            FullDiskStore(MemoryStore::new()),
            Vec::new(),
        );
        let ticket = v.open_query("603", "").unwrap();
        v.update(loaded(ticket.generation, matrix()));
        assert_eq!(v.phase(), Phase::Idle);

        let err = v.open_query("1399", "s=2&e=5&me=10").unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
        assert_eq!(v.phase(), Phase::Error);
        assert_eq!(v.embed_url(), None);
        assert_eq!(v.title(), "Watch S2 E5");
        assert_eq!(v.update(loaded(ticket.generation, matrix())), Action::Stale);
    }

    #[test]
    fn test_malformed_route_is_error() {
        let mut v = view();
        assert!(v.open_query("1399", "s=0&e=1").is_err());
        assert_eq!(v.phase(), Phase::Error);
    }

    #[test]
    fn test_provider_switch_resolves_fresh_url() {
        let mut v = view();
        let ticket = v.open_query("1399", "s=2&e=5&me=10").unwrap();
        v.update(loaded(ticket.generation, thrones()));
        v.update(counted(ticket.generation, 10));

        assert_eq!(
            v.update(Message::ProviderSelected("CLUB".into())),
            Action::Embed("https://moviesapi.club/tv/1399-2-5".into())
        );
        assert_eq!(
            v.persisted().store().get(SELECTED_SOURCE_KEY).unwrap().as_deref(),
            Some("CLUB")
        );

        // Same selection again still yields a fresh embed.
        assert_eq!(
            v.update(Message::ProviderSelected("CLUB".into())),
            Action::Embed("https://moviesapi.club/tv/1399-2-5".into())
        );

        // Unknown provider falls back to the default.
        assert_eq!(
            v.update(Message::ProviderSelected("GONE".into())),
            Action::Embed("https://vidsrc.pro/embed/tv/1399/2/5?autoplay=1&theme=ff2222".into())
        );
    }

    #[test]
    fn test_provider_selection_while_loading_persists_only() {
        let mut v = view();
        v.open_query("603", "").unwrap();
        assert_eq!(v.update(Message::ProviderSelected("TO".into())), Action::None);
        assert_eq!(v.selected_provider().name, "TO");
    }

    #[test]
    fn test_back_navigation() {
        let mut v = view();
        assert_eq!(v.update(Message::Back), Action::NavigateTo("/".into()));
        v.open_query("1399", "s=1&e=1&me=3").unwrap();
        assert_eq!(
            v.update(Message::Back),
            Action::NavigateTo("/series/1399".into())
        );
    }

    struct DeniedDocument;

    impl EmbeddedDocument for DeniedDocument {
        fn remove_matching(&mut self, _selector: &str) -> Result<usize, DocumentAccessError> {
            Err(DocumentAccessError::AccessDenied)
        }
    }

    struct OpenDocument(usize);

    impl EmbeddedDocument for OpenDocument {
        fn remove_matching(&mut self, _selector: &str) -> Result<usize, DocumentAccessError> {
            Ok(std::mem::take(&mut self.0))
        }
    }

    #[test]
    fn test_embed_loaded_hook() {
        let mut v = view();
        let ticket = v.open_query("603", "").unwrap();
        assert_eq!(v.on_embed_loaded(Some(&mut OpenDocument(2))), 0);

        v.update(loaded(ticket.generation, matrix()));
        assert_eq!(v.on_embed_loaded(Some(&mut DeniedDocument)), 0);
        assert_eq!(v.on_embed_loaded(None), 0);
        assert_eq!(v.on_embed_loaded(Some(&mut OpenDocument(2))), 2);
        assert_eq!(v.phase(), Phase::Idle);
    }

    #[test]
    fn test_viewed_list_written_under_expected_key() {
        let mut v = view();
        let ticket = v.open_query("603", "").unwrap();
        v.update(loaded(ticket.generation, matrix()));
        assert!(v.persisted().store().get(VIEWED_KEY).unwrap().is_some());
    }
}
