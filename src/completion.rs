//! Chat Completion Client
//!
//! Streaming client for an OpenAI-compatible `/v1/chat/completions`
//! endpoint. The response body is fed through [`StreamDecoder`] under a
//! whole-stream timeout.

use crate::config::Config;
use crate::conversation::Turn;
use crate::error::{GatewayError, Result};
use crate::streaming::StreamDecoder;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Persona and formatting rules sent ahead of every conversation
pub const SYSTEM_PROMPT: &str = "\
You are a friendly AI assistant in a Telegram chat. Help users with any question or task. \
Be helpful and concise.

CRITICAL - DO NOT USE MARKDOWN:
- Never use **, *, __, `, ```, [ ] or any other markdown syntax.
- Use ONLY the HTML tags listed below.

ALLOWED FORMATTING (HTML only):
<b>bold text</b>
<i>italic text</i>
<code>inline code such as npm install</code>

For code blocks ALWAYS use this exact format:
<pre>code
on
several
lines</pre>

Or with a language:
<pre><code class=\"language-javascript\">code here</code></pre>

IMPORTANT - HTML/CSS/JS CODE:
When code contains <, > or &, escape them:
< is written as &lt;
> is written as &gt;
& is written as &amp;

For lists use line breaks and the bullet character, never asterisks:
WRONG: * Item 1
RIGHT: • Item 1

Remember: NEVER use markdown. HTML only.";

/// Anything that can turn a conversation into an answer
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce the assistant reply for `turns` (oldest first)
    async fn complete(&self, turns: &[Turn]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

/// HTTP client for the upstream completion API
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(api_url: &str, api_key: Option<&str>, model: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
            timeout,
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.chat_api_url,
            config.upstream_api_key.as_deref(),
            &config.chat_model,
            config.upstream_timeout,
        )
    }

    /// Check if the API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request<'a>(&'a self, turns: &'a [Turn]) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        messages.extend(turns.iter().map(|turn| WireMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
        }
    }

    async fn stream_answer(&self, turns: &[Turn]) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GatewayError::Config("OLLAMA_API_KEY not set".to_string()))?;

        let request = self.build_request(turns);
        debug!(
            "Calling completion API: model={}, turns={}",
            self.model,
            turns.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, body });
        }

        let answer = StreamDecoder::consume(response.bytes_stream()).await?;
        Ok(answer)
    }
}

#[async_trait]
impl ChatBackend for CompletionClient {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let started = Instant::now();

        let answer = tokio::time::timeout(self.timeout, self.stream_answer(turns))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs()))??;

        info!(
            "Completion finished: model={}, chars={}, elapsed={}ms",
            self.model,
            answer.chars().count(),
            started.elapsed().as_millis()
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: Option<&str>) -> CompletionClient {
        CompletionClient::new(
            "http://127.0.0.1:9/v1/chat/completions",
            api_key,
            "test-model",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_request_shape() {
        let client = client(Some("key"));
        let turns = vec![Turn::user("hello"), Turn::assistant("hi!")];

        let json = serde_json::to_value(client.build_request(&turns)).unwrap();

        assert_eq!(json["model"], "test-model");
        assert_eq!(json["stream"], true);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "hello");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = client(None);
        assert!(!client.is_available());

        let err = client.complete(&[Turn::user("hi")]).await.unwrap_err();
        assert!(err.is_config());
    }
}
