//! Event dispatch
//!
//! [`Gateway::handle`] takes one webhook update through classification,
//! access control and exactly one handling path. It never fails: errors are
//! logged and reported as [`DispatchOutcome::Failed`] so the webhook can
//! always acknowledge.

use crate::access::{AccessControl, AccessDecision};
use crate::completion::ChatBackend;
use crate::config::Config;
use crate::conversation::{ConversationHistory, HistoryStore, Turn};
use crate::error::Result;
use crate::store::SharedStore;
use crate::telegram::{
    escape_html, html_to_plain, preview, ClassifyResult, ImageRequest, InlineRequest,
    InlineResult, Messenger, TextFormat, TextRequest, Update,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const EMPTY_ANSWER_REPLY: &str = "No response received from the model.";
const PASSWORD_PROMPT: &str = "🔐 Please send the password to use the bot.";
const PASSWORD_ACCEPTED: &str = "✅ Correct password. You can now use the bot.";
const IMAGE_USAGE: &str =
    "❌ You must provide a prompt.\n\nExample: <code>/image 1024x768 a cat astronaut</code>";
const ACCESS_DENIED: &str = "⛔ You are not allowed to use this bot";
const INLINE_ANSWER_TITLE: &str = "AI answer";

/// Which path an update took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a text message or inline query
    Ignored,
    /// Sender is on the block list; nothing was sent
    Blocked,
    /// Sender was asked for the password
    PasswordRequested,
    /// Sender supplied the password
    PasswordAccepted,
    /// Admin command applied
    Admin(AdminCommand),
    /// Photo sent for an image command
    Image(ImageRequest),
    /// Image command without a prompt; usage sent
    ImageUsage,
    /// Chat reply sent
    Chat,
    /// Inline query answered
    Inline(InlineOutcome),
    /// Processing error, already logged
    Failed(String),
}

/// Which answer an inline query received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineOutcome {
    Placeholder,
    Image,
    Denied,
    Answer,
    Error,
}

/// Admin-only moderation commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Block(String),
    Unblock(String),
    SetPassword(String),
    UnsetPassword,
}

impl AdminCommand {
    /// Parse `/block <id>`, `/unblock <id>`, `/setPassword <words...>` or
    /// `/unsetPassword`. A command missing its argument is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.starts_with('/') {
            return None;
        }

        let parts: Vec<&str> = text.split(' ').collect();
        let argument = parts.get(1).filter(|arg| !arg.is_empty());

        match (parts[0], argument) {
            ("/block", Some(id)) => Some(Self::Block(id.to_string())),
            ("/unblock", Some(id)) => Some(Self::Unblock(id.to_string())),
            ("/setPassword", Some(_)) => Some(Self::SetPassword(parts[1..].join(" "))),
            ("/unsetPassword", _) => Some(Self::UnsetPassword),
            _ => None,
        }
    }

    fn confirmation(&self) -> String {
        match self {
            Self::Block(id) => format!("✅ User {} blocked.", id),
            Self::Unblock(id) => format!("✅ User {} unblocked.", id),
            Self::SetPassword(_) => {
                "🔐 Password set.\n\nUsers must send the password to use the bot.".to_string()
            }
            Self::UnsetPassword => "✅ Password removed. The bot is public again.".to_string(),
        }
    }
}

/// Routes inbound updates to their handling path
#[derive(Clone)]
pub struct Gateway {
    access: AccessControl,
    history: HistoryStore,
    backend: Arc<dyn ChatBackend>,
    messenger: Arc<dyn Messenger>,
    admin_id: Option<String>,
    image_endpoint: String,
    bot_username: String,
}

impl Gateway {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn ChatBackend>,
        messenger: Arc<dyn Messenger>,
        admin_id: Option<String>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            access: AccessControl::new(store.clone()),
            history: HistoryStore::new(store),
            backend,
            messenger,
            admin_id,
            image_endpoint: defaults.image_endpoint,
            bot_username: defaults.bot_username,
        }
    }

    /// Build from deployment config
    pub fn from_config(
        config: &Config,
        store: SharedStore,
        backend: Arc<dyn ChatBackend>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            access: AccessControl::new(store.clone()),
            history: HistoryStore::with_limits(
                store,
                config.history_char_budget,
                config.history_ttl,
            ),
            backend,
            messenger,
            admin_id: config.admin_chat_id.clone(),
            image_endpoint: config.image_endpoint.clone(),
            bot_username: config.bot_username.clone(),
        }
    }

    pub fn with_image_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.image_endpoint = endpoint.into();
        self
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admin_id.as_deref() == Some(user_id)
    }

    /// Process one update
    pub async fn handle(&self, update: Update) -> DispatchOutcome {
        let result = match update.classify() {
            ClassifyResult::Ignorable => Ok(DispatchOutcome::Ignored),
            ClassifyResult::TextMessage(request) => {
                info!(
                    ">>> Message received: user={} ({}), chat={}, text={:?}",
                    request.sender.user_id,
                    request.sender.user_name,
                    request.conversation_id,
                    preview(&request.text, 50)
                );
                self.handle_text(request).await
            }
            ClassifyResult::InlineQuery(request) => {
                info!(
                    ">>> Inline query: user={} ({}), query={:?}",
                    request.sender.user_id,
                    request.sender.user_name,
                    preview(&request.query, 50)
                );
                self.handle_inline(request).await
            }
        };

        result.unwrap_or_else(|e| {
            error!("Error handling update: {}", e);
            DispatchOutcome::Failed(e.to_string())
        })
    }

    async fn handle_text(&self, request: TextRequest) -> Result<DispatchOutcome> {
        let is_admin = self.is_admin(&request.sender.user_id);

        if let Some(image) = ImageRequest::from_command(&request.text) {
            return self.handle_image(&request, is_admin, image).await;
        }

        if is_admin {
            if let Some(command) = AdminCommand::parse(&request.text) {
                return self.handle_admin(&request.conversation_id, command).await;
            }
        }

        let decision = self
            .access
            .evaluate(&request.sender.user_id, is_admin, &request.text)
            .await?;

        match decision {
            AccessDecision::Blocked => Ok(DispatchOutcome::Blocked),
            AccessDecision::NeedsPassword => {
                self.messenger
                    .send_text(&request.conversation_id, PASSWORD_PROMPT, TextFormat::Html)
                    .await?;
                Ok(DispatchOutcome::PasswordRequested)
            }
            AccessDecision::PasswordAccepted => {
                self.messenger
                    .send_text(&request.conversation_id, PASSWORD_ACCEPTED, TextFormat::Html)
                    .await?;
                Ok(DispatchOutcome::PasswordAccepted)
            }
            AccessDecision::Allowed => self.handle_chat(&request, is_admin).await,
        }
    }

    async fn handle_admin(
        &self,
        conversation_id: &str,
        command: AdminCommand,
    ) -> Result<DispatchOutcome> {
        match &command {
            AdminCommand::Block(id) => self.access.block(id).await?,
            AdminCommand::Unblock(id) => self.access.unblock(id).await?,
            AdminCommand::SetPassword(secret) => self.access.set_password(secret).await?,
            AdminCommand::UnsetPassword => self.access.unset_password().await?,
        }
        info!("Admin command applied: {:?}", command);

        self.messenger
            .send_text(conversation_id, &command.confirmation(), TextFormat::Html)
            .await?;
        Ok(DispatchOutcome::Admin(command))
    }

    async fn handle_image(
        &self,
        request: &TextRequest,
        is_admin: bool,
        image: ImageRequest,
    ) -> Result<DispatchOutcome> {
        if !is_admin && self.access.is_blocked(&request.sender.user_id).await {
            info!("Blocked user {} requested an image", request.sender.user_id);
            return Ok(DispatchOutcome::Blocked);
        }

        if !image.has_prompt() {
            self.messenger
                .send_text(&request.conversation_id, IMAGE_USAGE, TextFormat::Html)
                .await?;
            return Ok(DispatchOutcome::ImageUsage);
        }

        debug!("Image request: {} {:?}", image.resolution(), image.prompt);
        let url = image.url(&self.image_endpoint)?;
        self.messenger
            .send_photo(&request.conversation_id, url.as_str(), &image.caption())
            .await?;

        if !is_admin {
            let log = format!(
                "🎨 <b>Image generation</b>\n\n👤 User: @{} (ID: {})\n📐 Resolution: {}\n✏️ Prompt: {}",
                escape_html(&request.sender.user_name),
                request.sender.user_id,
                image.resolution(),
                escape_html(&image.prompt)
            );
            self.mirror_to_admin(&log).await;
        }

        Ok(DispatchOutcome::Image(image))
    }

    async fn handle_chat(&self, request: &TextRequest, is_admin: bool) -> Result<DispatchOutcome> {
        let conversation_id = &request.conversation_id;

        let mut history = self.history.load(conversation_id).await;
        self.history
            .append(&mut history, Turn::user(request.text.as_str()));
        info!(
            "History for chat {}: {} turns, {} chars",
            conversation_id,
            history.len(),
            history.total_chars()
        );

        let answer = self.backend.complete(history.turns()).await?;
        info!("Answer generated ({} chars)", answer.chars().count());

        self.history
            .append(&mut history, Turn::assistant(answer.as_str()));
        self.history.persist(conversation_id, &history).await?;

        let reply = if answer.is_empty() {
            EMPTY_ANSWER_REPLY
        } else {
            answer.as_str()
        };
        self.send_with_fallback(conversation_id, reply).await?;

        if !is_admin {
            let log = format!(
                "📊 <b>New conversation</b>\n\n👤 User: @{} (ID: {})\n💬 Chat ID: {}\n\n❓ <b>Question:</b>\n{}\n\n✅ <b>Answer:</b>\n{}",
                escape_html(&request.sender.user_name),
                request.sender.user_id,
                conversation_id,
                escape_html(&request.text),
                escape_html(&answer)
            );
            self.mirror_to_admin(&log).await;
        }

        Ok(DispatchOutcome::Chat)
    }

    /// Send HTML; if Telegram rejects it, send a plain-text rendering once
    async fn send_with_fallback(&self, chat_id: &str, html: &str) -> Result<()> {
        match self.messenger.send_text(chat_id, html, TextFormat::Html).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("HTML send to chat {} failed ({}), retrying as plain text", chat_id, e);
                self.messenger
                    .send_text(chat_id, &html_to_plain(html), TextFormat::Plain)
                    .await
            }
        }
    }

    /// Best effort: failures are logged, never surfaced
    async fn mirror_to_admin(&self, text: &str) {
        let Some(admin_id) = self.admin_id.as_deref() else {
            return;
        };

        if let Err(e) = self.messenger.send_text(admin_id, text, TextFormat::Html).await {
            warn!("Failed to mirror conversation to admin: {}", e);
        }
    }

    async fn handle_inline(&self, request: InlineRequest) -> Result<DispatchOutcome> {
        let is_admin = self.is_admin(&request.sender.user_id);

        if request.query.is_empty() {
            let placeholder = InlineResult::article(
                "Type your question or use 'image' to generate images",
                "Examples: 'hello' or 'image a cat astronaut'",
                &format!(
                    "💡 Use @{0} followed by your question\n🎨 Or use: <code>@{0} image your prompt here</code>",
                    self.bot_username
                ),
            );
            self.messenger
                .answer_inline_query(&request.query_id, vec![placeholder])
                .await?;
            return Ok(DispatchOutcome::Inline(InlineOutcome::Placeholder));
        }

        if !is_admin && self.access.is_blocked(&request.sender.user_id).await {
            info!("Blocked user {} sent an inline query", request.sender.user_id);
            let denied = InlineResult::article(
                "⛔ Access denied",
                "You are not allowed to use this bot",
                ACCESS_DENIED,
            );
            self.messenger
                .answer_inline_query(&request.query_id, vec![denied])
                .await?;
            return Ok(DispatchOutcome::Inline(InlineOutcome::Denied));
        }

        if let Some(image) = ImageRequest::from_inline_query(&request.query) {
            return self.handle_inline_image(&request, is_admin, image).await;
        }

        let turns = ConversationHistory::single(request.query.as_str());
        let answer = match self.backend.complete(turns.turns()).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Inline query {} failed: {}", request.query_id, e);
                let failure = InlineResult::article(
                    "❌ Error",
                    "There was an error processing your query",
                    "❌ Error processing the query. Please try again.",
                );
                self.messenger
                    .answer_inline_query(&request.query_id, vec![failure])
                    .await?;
                return Ok(DispatchOutcome::Inline(InlineOutcome::Error));
            }
        };

        let result = InlineResult::article(INLINE_ANSWER_TITLE, &preview(&answer, 100), &answer);
        self.messenger
            .answer_inline_query(&request.query_id, vec![result])
            .await?;

        if !is_admin {
            let log = format!(
                "🔍 <b>Inline Query</b>\n\n👤 User: @{} (ID: {})\n\n❓ <b>Question:</b>\n{}\n\n✅ <b>Answer:</b>\n{}",
                escape_html(&request.sender.user_name),
                request.sender.user_id,
                escape_html(&request.query),
                escape_html(&answer)
            );
            self.mirror_to_admin(&log).await;
        }

        Ok(DispatchOutcome::Inline(InlineOutcome::Answer))
    }

    async fn handle_inline_image(
        &self,
        request: &InlineRequest,
        is_admin: bool,
        image: ImageRequest,
    ) -> Result<DispatchOutcome> {
        let url = image.url(&self.image_endpoint)?;
        let result = InlineResult::Photo {
            id: "1".to_string(),
            photo_url: url.to_string(),
            title: format!("🎨 {}", image.prompt),
            description: image.resolution(),
            caption: image.caption(),
        };
        self.messenger
            .answer_inline_query(&request.query_id, vec![result])
            .await?;

        if !is_admin {
            let log = format!(
                "🎨 <b>Inline image generation</b>\n\n👤 User: @{} (ID: {})\n📐 Resolution: {}\n✏️ Prompt: {}",
                escape_html(&request.sender.user_name),
                request.sender.user_id,
                image.resolution(),
                escape_html(&image.prompt)
            );
            self.mirror_to_admin(&log).await;
        }

        Ok(DispatchOutcome::Inline(InlineOutcome::Image))
    }
}
