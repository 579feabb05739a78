//! Persisted view state.
//!
//! A small key/value interface sits under a typed layer that owns the key
//! layout (`viewed`, `continue_{id}`, `selectedSource`). The SQLite store is
//! used by the app; the in-memory store backs tests and throwaway sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CoreError;
use crate::history::{ContinueBookmark, ViewedEntry, ViewedList};
use crate::models::EpisodeRef;
use crate::providers::{Provider, ProviderRegistry};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");

pub const VIEWED_KEY: &str = "viewed";
pub const SELECTED_SOURCE_KEY: &str = "selectedSource";
const CONTINUE_PREFIX: &str = "continue_";

/// String key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// SQLite-backed key/value store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Volatile store for tests and sessions that should leave no trace.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        (**self).remove(key)
    }
}

/// Typed access to the persisted view state. Writes go through immediately;
/// concurrent writers are last-write-wins.
pub struct PersistedState<S> {
    store: S,
}

impl<S: KeyValueStore> PersistedState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Viewed list ─────────────────────────────────────────────

    /// The stored viewed list. Unreadable data is treated as empty.
    pub fn viewed(&self) -> Result<ViewedList, CoreError> {
        let Some(raw) = self.store.get(VIEWED_KEY)? else {
            return Ok(ViewedList::new());
        };
        match serde_json::from_str::<Vec<ViewedEntry>>(&raw) {
            Ok(entries) => Ok(ViewedList::from_entries(entries)),
            Err(e) => {
                tracing::warn!("discarding unreadable viewed list: {e}");
                Ok(ViewedList::new())
            }
        }
    }

    /// Record `entry` at the front of the viewed list and persist it.
    pub fn record_viewed(&self, entry: ViewedEntry) -> Result<ViewedList, CoreError> {
        let mut viewed = self.viewed()?;
        viewed.record(entry);
        self.store
            .set(VIEWED_KEY, &serde_json::to_string(&viewed)?)?;
        Ok(viewed)
    }

    // ── Continue bookmarks ──────────────────────────────────────

    pub fn bookmark(&self, media_id: &str) -> Result<Option<ContinueBookmark>, CoreError> {
        let Some(raw) = self.store.get(&continue_key(media_id))? else {
            return Ok(None);
        };
        let bookmark = serde_json::from_str::<ContinueBookmark>(&raw)
            .map_err(CoreError::from)
            .and_then(|b| EpisodeRef::new(b.season, b.episode));
        match bookmark {
            Ok(bookmark) => Ok(Some(bookmark)),
            Err(e) => {
                tracing::warn!(media_id, "discarding unreadable bookmark: {e}");
                Ok(None)
            }
        }
    }

    pub fn save_bookmark(
        &self,
        media_id: &str,
        bookmark: ContinueBookmark,
    ) -> Result<(), CoreError> {
        self.store
            .set(&continue_key(media_id), &serde_json::to_string(&bookmark)?)
    }

    // ── Selected provider ───────────────────────────────────────

    /// The persisted provider if it still exists in `registry`, else the
    /// registry default. A stale selection is cleared.
    pub fn selected_provider<'r>(
        &self,
        registry: &'r ProviderRegistry,
    ) -> Result<&'r Provider, CoreError> {
        let Some(name) = self.store.get(SELECTED_SOURCE_KEY)? else {
            return Ok(registry.default_provider());
        };
        match registry.get_provider(&name) {
            Ok(provider) => Ok(provider),
            Err(CoreError::ProviderNotFound(_)) => {
                tracing::warn!(name, "stored provider no longer exists, using default");
                self.store.remove(SELECTED_SOURCE_KEY)?;
                Ok(registry.default_provider())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist `name` as the selection, falling back to the default when it
    /// is not a registry entry. Returns the provider actually selected.
    pub fn select_provider<'r>(
        &self,
        registry: &'r ProviderRegistry,
        name: &str,
    ) -> Result<&'r Provider, CoreError> {
        let provider = registry.get_or_default(name);
        self.store.set(SELECTED_SOURCE_KEY, &provider.name)?;
        Ok(provider)
    }
}

fn continue_key(media_id: &str) -> String {
    format!("{CONTINUE_PREFIX}{media_id}")
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), CoreError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}
