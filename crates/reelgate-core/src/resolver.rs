//! Maps a playback request and a provider to an embeddable URL.

use url::form_urlencoded;

use crate::models::PlaybackRequest;
use crate::providers::{ParamStyle, Provider, ProviderRegistry};

/// Build the embed URL for `request` on `provider`.
///
/// Pure and total: the registry has already validated every template, and
/// request identifiers are restricted to URL-safe characters.
pub fn resolve(request: &PlaybackRequest, provider: &Provider) -> String {
    let episode = request.episode();
    let template = match (episode, &provider.series_template) {
        (Some(_), Some(series)) => series.as_str(),
        _ => provider.movie_template.as_str(),
    };
    let placed = |name: &str| template.contains(&format!("{{{name}}}"));

    let type_seg = request.media_type().embed_segment();
    let id = request.media_id();
    let season = episode.map(|ep| ep.season.to_string());
    let episode_no = episode.map(|ep| ep.episode.to_string());

    let substitute = |part: &str| {
        let mut out = part.replace("{type}", type_seg).replace("{id}", id);
        if let (Some(s), Some(e)) = (&season, &episode_no) {
            out = out.replace("{season}", s).replace("{episode}", e);
        }
        out
    };

    let (path_part, query_part) = match template.split_once('?') {
        Some((path, query)) => (path, query),
        None => (template, ""),
    };
    let mut path = substitute(path_part);
    let mut query = substitute(query_part);

    match provider.style.query_keys() {
        None => {
            if !placed("id") {
                if !placed("type") {
                    push_segment(&mut path, type_seg);
                }
                push_segment(&mut path, id);
            }
            if let (Some(s), Some(e)) = (&season, &episode_no) {
                if !placed("season") {
                    push_segment(&mut path, s);
                }
                if !placed("episode") {
                    push_segment(&mut path, e);
                }
            }
        }
        Some((id_key, season_key, episode_key)) => {
            if !placed("id") {
                push_pair(&mut query, id_key, id);
            }
            if let (Some(s), Some(e)) = (&season, &episode_no) {
                if !placed("season") {
                    push_pair(&mut query, season_key, s);
                }
                if !placed("episode") {
                    push_pair(&mut query, episode_key, e);
                }
            }
        }
    }

    for (key, value) in &provider.extra_query {
        push_pair(&mut query, key, value);
    }

    if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    }
}

/// Resolve against the provider called `name`, or the registry default when
/// no such provider exists.
pub fn resolve_named(request: &PlaybackRequest, registry: &ProviderRegistry, name: &str) -> String {
    resolve(request, registry.get_or_default(name))
}

/// Short description of how a style addresses media, for listings.
pub fn describe_style(style: &ParamStyle) -> String {
    match style {
        ParamStyle::PathSegments => "path-segments".into(),
        ParamStyle::QueryParams => "query-params".into(),
        ParamStyle::QueryNamed {
            id_key,
            season_key,
            episode_key,
        } => format!("query-named ({id_key}, {season_key}, {episode_key})"),
    }
}

fn push_segment(path: &mut String, segment: &str) {
    while path.ends_with('/') {
        path.pop();
    }
    path.push('/');
    path.push_str(segment);
}

fn push_pair(query: &mut String, key: &str, value: &str) {
    if !query.is_empty() && !query.ends_with('&') {
        query.push('&');
    }
    query.extend(form_urlencoded::byte_serialize(key.as_bytes()));
    query.push('=');
    query.extend(form_urlencoded::byte_serialize(value.as_bytes()));
}
