use serde::{Deserialize, Serialize};

use crate::models::{EpisodeRef, MediaRecord, MediaType};

/// Maximum number of entries kept in the viewed list.
pub const VIEWED_LIMIT: usize = 15;

/// Where to resume a series, keyed by media id in storage.
pub type ContinueBookmark = EpisodeRef;

/// A recently viewed title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewedEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub title: String,
    #[serde(rename = "poster", default)]
    pub poster_path: Option<String>,
}

impl ViewedEntry {
    pub fn from_record(record: &MediaRecord, media_type: MediaType) -> Self {
        Self {
            id: record.id.clone(),
            media_type,
            title: record.title.clone(),
            poster_path: record.poster().map(str::to_string),
        }
    }

    fn same_media(&self, other: &ViewedEntry) -> bool {
        self.id == other.id && self.media_type == other.media_type
    }
}

/// Recency-ordered, deduplicated history of viewed media (newest first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewedList {
    entries: Vec<ViewedEntry>,
}

impl ViewedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored entries, enforcing the list invariants on data that
    /// may have been written by something else.
    pub fn from_entries(entries: Vec<ViewedEntry>) -> Self {
        let mut list = Self::new();
        for entry in entries.into_iter().rev() {
            list.record(entry);
        }
        list
    }

    /// Move `entry` to the front, replacing any entry for the same media.
    pub fn record(&mut self, entry: ViewedEntry) {
        self.entries.retain(|e| !e.same_media(&entry));
        self.entries.insert(0, entry);
        self.entries.truncate(VIEWED_LIMIT);
    }

    pub fn entries(&self) -> &[ViewedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
