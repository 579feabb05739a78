pub mod client;
pub mod error;
pub mod types;

pub use client::MetadataClient;
pub use error::MetadataError;
