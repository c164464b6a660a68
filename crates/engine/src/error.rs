//! Error types for the SiteCheck engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install chromium")]
    PlaywrightNotFound,

    #[error("Browser bridge error: {0}")]
    Bridge(String),

    #[error("Browser bridge exited before replying to request {0}")]
    BridgeClosed(u64),

    #[error("Page operation failed: {op} - {reason}")]
    PageOperation { op: String, reason: String },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {ms} ms waiting for: {what}")]
    Timeout { what: String, ms: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Result sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Screenshot decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl EngineError {
    pub fn timeout(what: impl Into<String>, ms: u64) -> Self {
        EngineError::Timeout {
            what: what.into(),
            ms,
        }
    }

    pub fn op(op: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::PageOperation {
            op: op.into(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
