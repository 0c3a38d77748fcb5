//! Telegram surface
//!
//! - `update`: inbound webhook payloads and their classification
//! - `messenger`: outbound sends (text, photo, inline answers)
//! - `format`: HTML escaping and the plain-text fallback
//! - `image`: `/image [WxH] prompt` parsing and URL building

pub mod format;
pub mod image;
pub mod messenger;
pub mod update;

pub use format::{escape_html, html_to_plain, preview};
pub use image::ImageRequest;
pub use messenger::{InlineResult, Messenger, TelegramMessenger, TextFormat};
pub use update::{ClassifyResult, InlineRequest, Sender, TextRequest, Update};
