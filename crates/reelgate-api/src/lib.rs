pub mod metadata;
pub mod traits;

pub use metadata::{MetadataClient, MetadataError};
pub use traits::MetadataService;
