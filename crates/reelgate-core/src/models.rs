mod media;
mod request;

pub use media::{MediaImages, MediaRecord, MediaShort, MediaType};
pub use request::{EpisodeRef, PlaybackRequest};
