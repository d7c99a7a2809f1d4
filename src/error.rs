//! Error types

use thiserror::Error;

/// Bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Notification failed: {0}")]
    Notify(String),
}

/// How a failed call should be absorbed by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttled by the exchange, worth retrying after a backoff
    Throttled,
    /// The request can never succeed (unknown symbol, bad parameter)
    Rejected,
    /// Anything else: timeouts, resets, 5xx, undecodable bodies
    Transient,
}

impl BotError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BotError::RateLimited(_) => ErrorClass::Throttled,
            BotError::InvalidRequest(_) => ErrorClass::Rejected,
            BotError::Http(e) => match e.status().map(|s| s.as_u16()) {
                Some(429) => ErrorClass::Throttled,
                Some(400) | Some(404) => ErrorClass::Rejected,
                _ => ErrorClass::Transient,
            },
            BotError::Api { status: 429, .. } => ErrorClass::Throttled,
            BotError::Api { status: 400, .. } => ErrorClass::Rejected,
            _ => ErrorClass::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
