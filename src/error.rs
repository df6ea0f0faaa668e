use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("controller request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown analysis task: {0}")]
    UnknownTask(String),
}
