//! Catalog of playback providers.
//!
//! The registry is data-driven: each entry carries its URL templates and a
//! [`ParamStyle`] describing how identifiers the template does not place
//! itself are added to the URL. Built-in entries come from an embedded TOML
//! file; a user file with the same shape can replace or extend them.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Embedded provider registry.
const EMBEDDED_REGISTRY: &str = include_str!("../data/providers.toml");

/// Placeholders a template may contain.
pub const PLACEHOLDERS: &[&str] = &["type", "id", "season", "episode"];

/// How a provider expects identifiers to be addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParamStyle {
    /// `/movie/{id}` or `/tv/{id}/{season}/{episode}`.
    PathSegments,
    /// `?id={id}&s={season}&e={episode}`.
    QueryParams,
    /// Query parameters under provider-specific key names.
    QueryNamed {
        id_key: String,
        season_key: String,
        episode_key: String,
    },
}

impl ParamStyle {
    /// Query keys for (id, season, episode), or `None` for path addressing.
    pub fn query_keys(&self) -> Option<(&str, &str, &str)> {
        match self {
            Self::PathSegments => None,
            Self::QueryParams => Some(("id", "s", "e")),
            Self::QueryNamed {
                id_key,
                season_key,
                episode_key,
            } => Some((id_key, season_key, episode_key)),
        }
    }
}

/// A named third-party embed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Unique key, also persisted as the selected provider.
    pub name: String,
    /// Display label; falls back to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub movie_template: String,
    /// Used for series when present, else `movie_template` plus positional
    /// season/episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_template: Option<String>,
    pub style: ParamStyle,
    /// Fixed query pairs appended after all identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_query: Vec<(String, String)>,
}

impl Provider {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn validate(&self) -> Result<(), CoreError> {
        let fail = |msg: String| CoreError::Registry(format!("provider {:?}: {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(CoreError::Registry("provider with empty name".into()));
        }

        let movie_placeholders = validate_template(&self.movie_template).map_err(&fail)?;
        if movie_placeholders
            .iter()
            .any(|p| *p == "season" || *p == "episode")
        {
            return Err(fail(
                "movie_template cannot place {season} or {episode}".into(),
            ));
        }
        if let Some(series) = &self.series_template {
            validate_template(series).map_err(&fail)?;
        }

        if let Some((id, season, episode)) = self.style.query_keys() {
            for key in [id, season, episode] {
                if !is_valid_query_key(key) {
                    return Err(fail(format!("invalid query key {key:?}")));
                }
            }
        }
        for (key, _) in &self.extra_query {
            if !is_valid_query_key(key) {
                return Err(fail(format!("invalid extra query key {key:?}")));
            }
        }
        Ok(())
    }
}

/// Wrapper for TOML deserialization.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "provider", default)]
    providers: Vec<Provider>,
}

/// Ordered, validated set of providers. Never empty.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Load the embedded registry.
    pub fn embedded() -> Self {
        Self::from_toml(EMBEDDED_REGISTRY).expect("embedded providers.toml should be valid")
    }

    /// Embedded registry with the user file at `path` merged over it, if the
    /// file exists.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let mut registry = Self::embedded();
        if path.exists() {
            let user_str = std::fs::read_to_string(path)?;
            let user = parse_file(&user_str)?;
            registry.merge_user(user)?;
            tracing::debug!(path = %path.display(), "merged user provider registry");
        }
        Ok(registry)
    }

    /// Parse and validate a registry from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        Self::from_providers(parse_file(toml_str)?)
    }

    pub fn from_providers(providers: Vec<Provider>) -> Result<Self, CoreError> {
        validate_all(&providers)?;
        Ok(Self { providers })
    }

    /// Merge user providers into this registry.
    /// Providers with matching names are replaced in place; new ones are appended.
    /// On validation failure the registry is left unchanged.
    pub fn merge_user(&mut self, user: Vec<Provider>) -> Result<(), CoreError> {
        let mut merged = self.providers.clone();
        for user_provider in user {
            if let Some(existing) = merged.iter_mut().find(|p| p.name == user_provider.name) {
                *existing = user_provider;
            } else {
                merged.push(user_provider);
            }
        }
        validate_all(&merged)?;
        self.providers = merged;
        Ok(())
    }

    /// All providers in selection order.
    pub fn list_providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn get_provider(&self, name: &str) -> Result<&Provider, CoreError> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CoreError::ProviderNotFound(name.to_string()))
    }

    /// The fallback selection: the first registry entry.
    pub fn default_provider(&self) -> &Provider {
        &self.providers[0]
    }

    /// Look up `name`, substituting the default when it is unknown.
    pub fn get_or_default(&self, name: &str) -> &Provider {
        match self.get_provider(name) {
            Ok(provider) => provider,
            Err(_) => {
                tracing::debug!(name, "unknown provider, using default");
                self.default_provider()
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name == name)
    }
}

fn parse_file(toml_str: &str) -> Result<Vec<Provider>, CoreError> {
    let file: RegistryFile =
        toml::from_str(toml_str).map_err(|e| CoreError::Registry(e.to_string()))?;
    Ok(file.providers)
}

fn validate_all(providers: &[Provider]) -> Result<(), CoreError> {
    if providers.is_empty() {
        return Err(CoreError::Registry("registry has no providers".into()));
    }
    let mut seen = HashSet::new();
    for provider in providers {
        provider.validate()?;
        if !seen.insert(provider.name.as_str()) {
            return Err(CoreError::Registry(format!(
                "duplicate provider name {:?}",
                provider.name
            )));
        }
    }
    Ok(())
}

/// Check a template's placeholders and that it forms an absolute http(s) URL.
/// Returns the placeholders it uses.
fn validate_template(template: &str) -> Result<Vec<&str>, String> {
    let placeholders = scan_placeholders(template)?;
    for name in &placeholders {
        if !PLACEHOLDERS.contains(name) {
            return Err(format!("unknown placeholder {{{name}}} in {template:?}"));
        }
    }

    let mut sample = template.to_string();
    for name in PLACEHOLDERS {
        sample = sample.replace(&format!("{{{name}}}"), "1");
    }
    let url = url::Url::parse(&sample).map_err(|e| format!("invalid URL {template:?}: {e}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("template must be http(s): {template:?}"));
    }
    if url.fragment().is_some() {
        return Err(format!("template must not carry a fragment: {template:?}"));
    }
    Ok(placeholders)
}

/// Collect `{name}` tokens, rejecting unbalanced braces.
fn scan_placeholders(template: &str) -> Result<Vec<&str>, String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(format!("unbalanced '}}' in {template:?}"));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unclosed '{{' in {template:?}"))?;
        let name = &after[..close];
        if name.contains('{') {
            return Err(format!("nested '{{' in {template:?}"));
        }
        found.push(name);
        rest = &after[close + 1..];
    }
    Ok(found)
}

fn is_valid_query_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
