//! Error types
//!
//! Malformed data (bad stream lines, corrupt persisted JSON) never shows up
//! here: it is recovered where it is found.

/// Key-value backend failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Errors surfaced by the conversation pipeline
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream stream timed out after {0} seconds")]
    Timeout(u64),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// True for errors caused by missing deployment secrets
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
