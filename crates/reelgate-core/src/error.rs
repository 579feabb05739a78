use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
