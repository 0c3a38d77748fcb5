//! Inbound webhook payloads
//!
//! Only the fields the gateway reads are modelled; everything else in the
//! Telegram update is ignored.

use serde::Deserialize;

/// Telegram user
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl User {
    /// Username, else first name, else "Unknown"
    pub fn display_name(&self) -> String {
        fn present(name: &Option<String>) -> Option<&str> {
            name.as_deref().filter(|n| !n.is_empty())
        }
        present(&self.username)
            .or_else(|| present(&self.first_name))
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    #[serde(default)]
    pub query: String,
    pub from: User,
}

/// Webhook body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub inline_query: Option<InlineQuery>,
}

/// Who sent an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: String,
    pub user_name: String,
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.to_string(),
            user_name: user.display_name(),
        }
    }
}

/// A direct or group text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
}

/// An inline query typed in any chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineRequest {
    pub query_id: String,
    pub sender: Sender,
    /// Query with surrounding whitespace removed
    pub query: String,
}

/// First dispatch stage: what kind of event is this
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyResult {
    InlineQuery(InlineRequest),
    TextMessage(TextRequest),
    /// No text, no sender, or an update kind the gateway does not handle
    Ignorable,
}

impl Update {
    pub fn classify(self) -> ClassifyResult {
        if let Some(query) = self.inline_query {
            return ClassifyResult::InlineQuery(InlineRequest {
                query_id: query.id,
                sender: Sender::from(&query.from),
                query: query.query.trim().to_string(),
            });
        }

        let Some(message) = self.message else {
            return ClassifyResult::Ignorable;
        };
        let (Some(text), Some(from)) = (message.text, message.from) else {
            return ClassifyResult::Ignorable;
        };
        if text.is_empty() {
            return ClassifyResult::Ignorable;
        }

        ClassifyResult::TextMessage(TextRequest {
            conversation_id: message.chat.id.to_string(),
            sender: Sender::from(&from),
            text,
        })
    }
}
