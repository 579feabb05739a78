//! Best-effort removal of ad elements from an embedded player document.
//!
//! Embeds are almost always cross-origin, in which case the document cannot
//! be reached at all. That is the normal case and is not reported as an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentAccessError {
    #[error("embedded document is cross-origin")]
    AccessDenied,

    #[error("selector rejected: {0}")]
    InvalidSelector(String),
}

/// The loaded content of an embed target, as far as the host can reach it.
pub trait EmbeddedDocument {
    /// Remove every element matching `selector`, returning how many were removed.
    fn remove_matching(&mut self, selector: &str) -> Result<usize, DocumentAccessError>;
}

/// Remove elements matching any of `markers`. Returns the number removed.
///
/// `None` means the host could not obtain the document at all.
pub fn strip_ads(document: Option<&mut dyn EmbeddedDocument>, markers: &[String]) -> usize {
    let Some(document) = document else {
        tracing::debug!("embedded document unavailable, skipping ad strip");
        return 0;
    };

    let mut removed = 0;
    for marker in markers {
        match document.remove_matching(marker) {
            Ok(n) => removed += n,
            Err(DocumentAccessError::AccessDenied) => {
                tracing::debug!("embedded document is cross-origin, skipping ad strip");
                return removed;
            }
            Err(e) => tracing::debug!(marker, "ad marker skipped: {e}"),
        }
    }
    if removed > 0 {
        tracing::debug!(removed, "stripped ad elements");
    }
    removed
}
