use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("browser unavailable: {0}")]
    Browser(String),

    #[error("usage: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a single target. The ingestion driver logs these and moves on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited (HTTP 403), set GITHUB_TOKEN to raise the limit")]
    RateLimited,

    #[error("not found (HTTP 404)")]
    NotFound,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unreadable payload: {0}")]
    Parse(String),

    #[error("browser: {0}")]
    Browser(String),
}
