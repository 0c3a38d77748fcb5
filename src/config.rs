//! Configuration management

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const DEFAULT_CHAT_API_URL: &str = "https://ollama.com/v1/chat/completions";
const DEFAULT_CHAT_MODEL: &str = "gpt-oss:120b-cloud";
const DEFAULT_IMAGE_ENDPOINT: &str = "https://image.pollinations.ai/prompt";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (sends fail without it)
    pub telegram_token: Option<String>,

    /// Bearer key for the completion API
    pub upstream_api_key: Option<String>,

    /// Admin user id; bypasses moderation and receives mirrored logs
    pub admin_chat_id: Option<String>,

    /// Completion endpoint
    pub chat_api_url: String,

    /// Model name sent upstream
    pub chat_model: String,

    /// Upper bound on one upstream stream read
    pub upstream_timeout: Duration,

    /// Redis URL (in-process store when absent)
    pub redis_url: Option<String>,

    /// History size budget in characters
    pub history_char_budget: usize,

    /// History inactivity TTL
    pub history_ttl: Duration,

    /// Base URL for image generation
    pub image_endpoint: String,

    /// Bot username shown in inline help
    pub bot_username: String,

    /// HTTP bind address
    pub bind_addr: IpAddr,

    /// HTTP port
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: None,
            upstream_api_key: None,
            admin_chat_id: None,
            chat_api_url: DEFAULT_CHAT_API_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            upstream_timeout: Duration::from_secs(120),
            redis_url: None,
            history_char_budget: crate::conversation::DEFAULT_CHAR_BUDGET,
            history_ttl: crate::conversation::DEFAULT_TTL,
            image_endpoint: DEFAULT_IMAGE_ENDPOINT.to_string(),
            bot_username: "smaicbot".to_string(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8787,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match non_empty("BIND_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("BIND_ADDR is not an IP address: {}", addr))?,
            None => defaults.bind_addr,
        };

        let port = match non_empty("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", port))?,
            None => defaults.port,
        };

        let upstream_timeout = Duration::from_secs(parse_or(
            "UPSTREAM_TIMEOUT_SECS",
            defaults.upstream_timeout.as_secs(),
        ));
        let history_ttl = Duration::from_secs(parse_or(
            "HISTORY_TTL_SECS",
            defaults.history_ttl.as_secs(),
        ));

        Ok(Self {
            telegram_token: non_empty("TELEGRAM_TOKEN"),
            upstream_api_key: non_empty("OLLAMA_API_KEY"),
            admin_chat_id: non_empty("ADMIN_CHAT_ID"),
            chat_api_url: non_empty("CHAT_API_URL").unwrap_or(defaults.chat_api_url),
            chat_model: non_empty("CHAT_MODEL").unwrap_or(defaults.chat_model),
            upstream_timeout,
            redis_url: non_empty("REDIS_URL"),
            history_char_budget: parse_or("HISTORY_CHAR_BUDGET", defaults.history_char_budget),
            history_ttl,
            image_endpoint: non_empty("IMAGE_ENDPOINT").unwrap_or(defaults.image_endpoint),
            bot_username: non_empty("BOT_USERNAME").unwrap_or(defaults.bot_username),
            bind_addr,
            port,
        })
    }

    /// Listener address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric variable, warning and falling back on garbage
fn parse_or<T: std::str::FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match non_empty(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{}={} is not a number, using {}", name, raw, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.history_char_budget, 4000);
        assert_eq!(config.history_ttl, Duration::from_secs(86400));
        assert_eq!(config.socket_addr().port(), 8787);
        assert!(config.admin_chat_id.is_none());
    }
}
