use serde::de::IgnoredAny;
use serde::Deserialize;

use super::error::MetadataError;

// ── Response envelope ────────────────────────────────────────────

/// Every endpoint wraps its payload as `{ success, data }`; listing
/// endpoints use `results` instead of `data`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default = "Option::default")]
    pub results: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, treating `success: false` or a missing payload as
    /// a failed call to `what`.
    pub fn into_payload(self, what: &str) -> Result<T, MetadataError> {
        if !self.success {
            return Err(MetadataError::Unsuccessful(what.to_string()));
        }
        self.data
            .or(self.results)
            .ok_or_else(|| MetadataError::Parse(format!("{what}: response has no payload")))
    }
}

/// Episode listing. Only its length matters to callers.
pub type EpisodeListing = Vec<IgnoredAny>;
