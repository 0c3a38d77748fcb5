//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chat_gateway::{
    ChatBackend, Gateway, GatewayError, InMemoryStore, InlineResult, Messenger, Result,
    SharedStore, TextFormat, Turn, Update,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub const ADMIN_ID: &str = "1000";
pub const IMAGE_ENDPOINT: &str = "https://img.test/prompt";

/// One outbound call captured by [`RecordingMessenger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: String,
        text: String,
        format: TextFormat,
    },
    Photo {
        chat_id: String,
        url: String,
        caption: String,
    },
    Inline {
        query_id: String,
        results: Vec<InlineResult>,
    },
}

/// Records every send; can be told to reject HTML or a given chat
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    reject_html: Mutex<bool>,
    failing_chats: Mutex<HashSet<String>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: &str) -> Vec<(String, TextFormat)> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text {
                    chat_id: to,
                    text,
                    format,
                } if to == chat_id => Some((text, format)),
                _ => None,
            })
            .collect()
    }

    pub fn reject_html(&self) {
        *self.reject_html.lock().unwrap() = true;
    }

    pub fn fail_chat(&self, chat_id: &str) {
        self.failing_chats.lock().unwrap().insert(chat_id.to_string());
    }

    fn check(&self, chat_id: &str) -> Result<()> {
        if self.failing_chats.lock().unwrap().contains(chat_id) {
            return Err(GatewayError::Telegram(format!("chat {} unreachable", chat_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: &str, text: &str, format: TextFormat) -> Result<()> {
        self.check(chat_id)?;
        if format == TextFormat::Html && *self.reject_html.lock().unwrap() {
            return Err(GatewayError::Telegram("can't parse entities".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: &str, photo_url: &str, caption: &str) -> Result<()> {
        self.check(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id: chat_id.to_string(),
            url: photo_url.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineResult>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Inline {
            query_id: query_id.to_string(),
            results,
        });
        Ok(())
    }
}

/// Returns queued answers in order (default "ok") and records each request
#[derive(Default)]
pub struct ScriptedBackend {
    answers: Mutex<VecDeque<std::result::Result<String, u16>>>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedBackend {
    pub fn answer(&self, text: &str) {
        self.answers.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, status: u16) {
        self.answers.lock().unwrap().push_back(Err(status));
    }

    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        self.calls.lock().unwrap().push(turns.to_vec());
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(status)) => Err(GatewayError::Upstream {
                status,
                body: "upstream down".to_string(),
            }),
            None => Ok("ok".to_string()),
        }
    }
}

/// Gateway wired to in-memory fakes
pub struct TestEnvironment {
    pub store: SharedStore,
    pub backend: Arc<ScriptedBackend>,
    pub messenger: Arc<RecordingMessenger>,
    pub gateway: Gateway,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let backend = Arc::new(ScriptedBackend::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let gateway = Gateway::new(
            store.clone(),
            backend.clone(),
            messenger.clone(),
            Some(ADMIN_ID.to_string()),
        )
        .with_image_endpoint(IMAGE_ENDPOINT);

        Self {
            store,
            backend,
            messenger,
            gateway,
        }
    }
}

/// Private-chat message update (chat id equals user id)
pub fn message(user_id: i64, text: &str) -> Update {
    update(serde_json::json!({
        "update_id": 1,
        "message": {
            "message_id": 1,
            "chat": {"id": user_id, "type": "private"},
            "from": {"id": user_id, "is_bot": false, "first_name": "Tester", "username": "tester"},
            "text": text
        }
    }))
}

pub fn inline_query(user_id: i64, query: &str) -> Update {
    update(serde_json::json!({
        "update_id": 2,
        "inline_query": {
            "id": "q1",
            "from": {"id": user_id, "is_bot": false, "first_name": "Tester"},
            "query": query,
            "offset": ""
        }
    }))
}

pub fn update(value: serde_json::Value) -> Update {
    serde_json::from_value(value).unwrap()
}
