use std::sync::Arc;

use thiserror::Error;

use reelgate_api::{MetadataClient, MetadataError, MetadataService};
use reelgate_core::config::AppConfig;
use reelgate_core::error::CoreError;
use reelgate_core::models::{MediaShort, PlaybackRequest};
use reelgate_core::providers::ProviderRegistry;
use reelgate_core::resolver;
use reelgate_core::route::WatchRoute;
use reelgate_core::storage::{KeyValueStore, MemoryStore, PersistedState, SqliteStore};
use reelgate_core::view::{Action, Message, WatchView};

use crate::{Cli, Command};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] MetadataError),

    #[error("cannot play this title ({reason}); returning to {to}")]
    Redirected { to: String, reason: String },
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load()?;
    let registry = Arc::new(ProviderRegistry::load(&AppConfig::providers_path())?);

    let store: Box<dyn KeyValueStore> = if cli.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SqliteStore::open(&AppConfig::ensure_db_path()?)?)
    };
    let store = store.as_ref();

    match cli.command {
        Command::Providers => list_providers(&registry, store),
        Command::Select { name } => select(&registry, store, &name),
        Command::Resolve {
            id,
            season,
            episode,
            provider,
        } => resolve(&registry, store, &id, season.zip(episode), provider.as_deref()),
        Command::Watch {
            id,
            season,
            episode,
            me,
        } => {
            let route = match season.zip(episode) {
                Some((s, e)) => WatchRoute::series(&id, s, e, me)?,
                None => WatchRoute::movie(&id)?,
            };
            let api = MetadataClient::from_config(&config.api)?;
            let mut view = WatchView::new(registry, store, config.playback.ad_markers.clone());
            watch(&mut view, &api, route).await
        }
        Command::History => history(store),
        Command::Continue { id } => continue_at(store, &id),
        Command::Search { query } => {
            let api = MetadataClient::from_config(&config.api)?;
            let results = api.search(&query.join(" ")).await?;
            print_cards(&results);
            Ok(())
        }
        Command::Popular => {
            let api = MetadataClient::from_config(&config.api)?;
            print_cards(&api.popular().await?);
            Ok(())
        }
    }
}

fn list_providers(registry: &ProviderRegistry, store: &dyn KeyValueStore) -> Result<(), CliError> {
    let state = PersistedState::new(store);
    let selected = state.selected_provider(registry)?.name.clone();
    for provider in registry.list_providers() {
        let marker = if provider.name == selected { '*' } else { ' ' };
        println!(
            "{marker} {:<8} {:<8} {:<36} {}",
            provider.name,
            provider.display_label(),
            resolver::describe_style(&provider.style),
            provider.movie_template,
        );
    }
    Ok(())
}

fn select(registry: &ProviderRegistry, store: &dyn KeyValueStore, name: &str) -> Result<(), CliError> {
    if !registry.contains(name) {
        tracing::warn!(name, "unknown provider, selecting the default instead");
    }
    let provider = PersistedState::new(store).select_provider(registry, name)?;
    println!("selected {}", provider.display_label());
    Ok(())
}

fn resolve(
    registry: &ProviderRegistry,
    store: &dyn KeyValueStore,
    id: &str,
    episode: Option<(u32, u32)>,
    provider: Option<&str>,
) -> Result<(), CliError> {
    let request = match episode {
        Some((season, episode)) => PlaybackRequest::series(id, season, episode)?,
        None => PlaybackRequest::movie(id)?,
    };
    let url = match provider {
        Some(name) => resolver::resolve_named(&request, registry, name),
        None => resolver::resolve(
            &request,
            PersistedState::new(store).selected_provider(registry)?,
        ),
    };
    println!("{url}");
    Ok(())
}

/// Drive a view through one load: both fetches run concurrently and their
/// results are fed back tagged with the ticket's generation.
async fn watch<S, M>(view: &mut WatchView<S>, api: &M, route: WatchRoute) -> Result<(), CliError>
where
    S: KeyValueStore,
    M: MetadataService,
{
    let ticket = view.open(route)?;

    let metadata = api.fetch_media(ticket.media_type, &ticket.media_id);
    let episode_count = async {
        match ticket.episode_count_season {
            Some(season) => Some(api.episode_count(&ticket.media_id, season).await),
            None => None,
        }
    };
    let (metadata, episode_count) = futures::join!(metadata, episode_count);

    let mut messages = vec![Message::MetadataLoaded {
        generation: ticket.generation,
        result: metadata.map_err(|e| e.to_string()),
    }];
    if let Some(count) = episode_count {
        messages.push(Message::EpisodeCountLoaded {
            generation: ticket.generation,
            result: count.map_err(|e| e.to_string()),
        });
    }

    for message in messages {
        match view.update(message) {
            Action::Embed(url) => {
                println!("{}", view.title());
                println!("  provider: {}", view.selected_provider().display_label());
                println!("  {url}");
                if let Some(next) = view.next_episode() {
                    println!("  next: {}", next.to_path());
                }
            }
            Action::Redirect { to, reason } => {
                return Err(CliError::Redirected {
                    to: to.to_string(),
                    reason,
                });
            }
            Action::None | Action::Stale | Action::NavigateTo(_) => {}
        }
    }
    Ok(())
}

fn history(store: &dyn KeyValueStore) -> Result<(), CliError> {
    let viewed = PersistedState::new(store).viewed()?;
    if viewed.is_empty() {
        println!("nothing viewed yet");
    }
    for entry in viewed.entries() {
        println!("{:<8} {:<10} {}", entry.media_type, entry.id, entry.title);
    }
    Ok(())
}

fn continue_at(store: &dyn KeyValueStore, id: &str) -> Result<(), CliError> {
    match PersistedState::new(store).bookmark(id)? {
        Some(bookmark) => {
            let route = WatchRoute::series(id, bookmark.season, bookmark.episode, None)?;
            println!("{}", route.to_path());
        }
        None => println!("no bookmark for {id}"),
    }
    Ok(())
}

fn print_cards(cards: &[MediaShort]) {
    if cards.is_empty() {
        println!("no results found");
    }
    for card in cards {
        println!("{:<8} {:<10} {}", card.media_type, card.id, card.title);
    }
}
