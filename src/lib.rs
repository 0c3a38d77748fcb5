//! Chat Gateway
//!
//! Telegram bot that relays conversations to a streaming chat-completion
//! backend.
//!
//! # Features
//!
//! - **Access control**: block list, shared password gate, verified users
//! - **History**: per-chat turns trimmed to a character budget, 24h rolling TTL
//! - **Streaming**: SSE-style completion stream decoded across arbitrary chunk boundaries
//! - **Images**: `/image [WxH] prompt` and inline `image ...` queries
//! - **Proxy**: CORS-enabled `/v1/chat/completions` passthrough
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► POST /webhook ──► Gateway ──► CompletionClient ──► upstream
//!                                   │              (stream)
//!                                   ├── AccessControl ──┐
//!                                   ├── HistoryStore ───┴── KeyValueStore (Redis / Moka)
//!                                   └── Messenger (teloxide)
//! ```

pub mod access;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod server;
pub mod store;
pub mod streaming;
pub mod telegram;

pub use access::{AccessControl, AccessDecision};
pub use completion::{ChatBackend, CompletionClient};
pub use config::Config;
pub use conversation::{ConversationHistory, HistoryStore, Role, Turn};
pub use dispatcher::{AdminCommand, DispatchOutcome, Gateway, InlineOutcome};
pub use error::{GatewayError, Result, StoreError};
pub use server::{build_router, AppState, CompletionProxy};
pub use store::{InMemoryStore, KeyValueStore, RedisStore, SharedStore};
pub use streaming::StreamDecoder;
pub use telegram::{InlineResult, Messenger, TelegramMessenger, TextFormat, Update};
