//! Outbound Telegram calls
//!
//! The dispatcher only sees the [`Messenger`] trait; [`TelegramMessenger`]
//! is the teloxide-backed implementation.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQueryResult, InlineQueryResultArticle, InlineQueryResultPhoto, InputFile,
    InputMessageContent, InputMessageContentText, ParseMode,
};
use tracing::debug;

/// Body format of an outgoing text message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Html,
    Plain,
}

/// One entry in an inline query answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineResult {
    /// Text result; `message_text` is HTML
    Article {
        id: String,
        title: String,
        description: String,
        message_text: String,
    },
    /// Photo by URL; `caption` is HTML
    Photo {
        id: String,
        photo_url: String,
        title: String,
        description: String,
        caption: String,
    },
}

impl InlineResult {
    pub fn article(title: &str, description: &str, message_text: &str) -> Self {
        Self::Article {
            id: "1".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            message_text: message_text.to_string(),
        }
    }
}

/// Outbound messaging surface
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message. An error means Telegram did not accept it.
    async fn send_text(&self, chat_id: &str, text: &str, format: TextFormat) -> Result<()>;

    /// Send a photo by URL with an HTML caption
    async fn send_photo(&self, chat_id: &str, photo_url: &str, caption: &str) -> Result<()>;

    /// Answer an inline query (never cached by Telegram)
    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineResult>) -> Result<()>;
}

/// Messenger backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Option<Bot>,
}

impl TelegramMessenger {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            bot: token.map(Bot::new),
        }
    }

    fn bot(&self) -> Result<&Bot> {
        self.bot
            .as_ref()
            .ok_or_else(|| GatewayError::Config("TELEGRAM_TOKEN not set".to_string()))
    }

    fn chat(chat_id: &str) -> Result<ChatId> {
        chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| GatewayError::Telegram(format!("invalid chat id: {}", chat_id)))
    }

    fn url(raw: &str) -> Result<Url> {
        Url::parse(raw).map_err(|e| GatewayError::Telegram(format!("invalid URL {}: {}", raw, e)))
    }

    fn to_teloxide(result: InlineResult) -> Result<InlineQueryResult> {
        match result {
            InlineResult::Article {
                id,
                title,
                description,
                message_text,
            } => {
                let content = InputMessageContent::Text(
                    InputMessageContentText::new(message_text).parse_mode(ParseMode::Html),
                );
                let article = InlineQueryResultArticle::new(id, title, content).description(description);
                Ok(InlineQueryResult::Article(article))
            }
            InlineResult::Photo {
                id,
                photo_url,
                title,
                description,
                caption,
            } => {
                let url = Self::url(&photo_url)?;
                let photo = InlineQueryResultPhoto::new(id, url.clone(), url)
                    .title(title)
                    .description(description)
                    .caption(caption)
                    .parse_mode(ParseMode::Html);
                Ok(InlineQueryResult::Photo(photo))
            }
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: &str, text: &str, format: TextFormat) -> Result<()> {
        let bot = self.bot()?;
        let mut request = bot.send_message(Self::chat(chat_id)?, text);
        if format == TextFormat::Html {
            request = request.parse_mode(ParseMode::Html);
        }
        request
            .await
            .map_err(|e| GatewayError::Telegram(e.to_string()))?;

        debug!("Sent {:?} message to chat {}", format, chat_id);
        Ok(())
    }

    async fn send_photo(&self, chat_id: &str, photo_url: &str, caption: &str) -> Result<()> {
        let bot = self.bot()?;
        bot.send_photo(Self::chat(chat_id)?, InputFile::url(Self::url(photo_url)?))
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| GatewayError::Telegram(e.to_string()))?;

        debug!("Sent photo to chat {}", chat_id);
        Ok(())
    }

    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineResult>) -> Result<()> {
        let bot = self.bot()?;
        let results = results
            .into_iter()
            .map(Self::to_teloxide)
            .collect::<Result<Vec<_>>>()?;

        bot.answer_inline_query(query_id.to_string(), results)
            .cache_time(0)
            .await
            .map_err(|e| GatewayError::Telegram(e.to_string()))?;

        debug!("Answered inline query {}", query_id);
        Ok(())
    }
}
