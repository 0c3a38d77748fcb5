//! Conversation Store
//!
//! Per-chat message history persisted as a JSON array under `chat_<id>`,
//! with a rolling expiry refreshed on every write.
//!
//! The history is bounded by a character budget measured on its serialized
//! form. Oldest turns go first, but the last remaining turn is never
//! evicted, even when it alone is over budget.

use crate::error::StoreError;
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default character budget for a stored history
pub const DEFAULT_CHAR_BUDGET: usize = 4000;

/// Default inactivity TTL (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns of one chat, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History holding a single user turn (inline queries)
    pub fn single(content: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(content)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Character count of the serialized history, in Unicode scalar values.
    ///
    /// Characters outside the BMP (most emoji) count once, not as two UTF-16
    /// units, so the budget is slightly more generous for such text.
    pub fn total_chars(&self) -> usize {
        self.to_json().chars().count()
    }

    /// Drop oldest turns until within `budget` or one turn remains.
    ///
    /// Returns the number of evicted turns.
    pub fn evict_to_budget(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while self.turns.len() > 1 && self.total_chars() > budget {
            self.turns.remove(0);
            evicted += 1;
        }
        evicted
    }

    pub fn to_json(&self) -> String {
        // Turns hold only strings and unit enums
        serde_json::to_string(&self.turns).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse a stored history; anything malformed yields an empty history
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Vec<Turn>>(raw) {
            Ok(turns) => Self { turns },
            Err(e) => {
                warn!("Discarding malformed conversation history: {}", e);
                Self::default()
            }
        }
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

/// Store for per-chat histories
#[derive(Clone)]
pub struct HistoryStore {
    store: SharedStore,
    char_budget: usize,
    ttl: Duration,
}

impl HistoryStore {
    pub fn new(store: SharedStore) -> Self {
        Self::with_limits(store, DEFAULT_CHAR_BUDGET, DEFAULT_TTL)
    }

    /// Custom budget and expiry
    pub fn with_limits(store: SharedStore, char_budget: usize, ttl: Duration) -> Self {
        Self {
            store,
            char_budget,
            ttl,
        }
    }


    fn key(conversation_id: &str) -> String {
        format!("chat_{}", conversation_id)
    }

    /// Load a chat's history; absent, unreadable or malformed is empty
    pub async fn load(&self, conversation_id: &str) -> ConversationHistory {
        match self.store.get(&Self::key(conversation_id)).await {
            Ok(Some(raw)) => ConversationHistory::from_json(&raw),
            Ok(None) => ConversationHistory::new(),
            Err(e) => {
                warn!("Failed to load history for chat {}: {}", conversation_id, e);
                ConversationHistory::new()
            }
        }
    }

    /// Add a turn and trim to the budget
    pub fn append(&self, history: &mut ConversationHistory, turn: Turn) {
        history.push(turn);
        let evicted = history.evict_to_budget(self.char_budget);
        if evicted > 0 {
            debug!("Evicted {} turns to stay within {} chars", evicted, self.char_budget);
        }
    }

    /// Write a history back, refreshing its expiry
    pub async fn persist(
        &self,
        conversation_id: &str,
        history: &ConversationHistory,
    ) -> Result<(), StoreError> {
        self.store
            .put(&Self::key(conversation_id), &history.to_json(), Some(self.ttl))
            .await?;
        debug!(
            "Saved history for chat {}: {} turns, {} chars",
            conversation_id,
            history.len(),
            history.total_chars()
        );
        Ok(())
    }

    /// Remove a chat's history
    pub async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.store.delete(&Self::key(conversation_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, KeyValueStore};
    use std::sync::Arc;

    fn history_of(contents: &[&str]) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for c in contents {
            history.push(Turn::user(*c));
        }
        history
    }

    #[test]
    fn test_serialized_shape() {
        let mut history = ConversationHistory::new();
        history.push(Turn::user("hi"));
        history.push(Turn::assistant("hello"));

        assert_eq!(
            history.to_json(),
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#
        );
        assert_eq!(history.total_chars(), history.to_json().len());
    }

    #[test]
    fn test_astral_characters_count_once() {
        let crabs = "🦀".repeat(10);
        let history = history_of(&[crabs.as_str()]);
        assert_eq!(history.total_chars(), 30 + 10);
    }

    #[test]
    fn test_total_chars_counts_characters_not_bytes() {
        let history = history_of(&["日本語"]);
        let json = history.to_json();
        assert_eq!(history.total_chars(), json.chars().count());
        assert!(history.total_chars() < json.len());
    }

    #[test]
    fn test_eviction_drops_oldest_first() {
        let mut history = history_of(&["first", "second", "third"]);
        let budget = history_of(&["second", "third"]).total_chars();

        let evicted = history.evict_to_budget(budget);

        assert_eq!(evicted, 1);
        assert_eq!(history.turns()[0].content, "second");
        assert_eq!(history.turns()[1].content, "third");
        assert!(history.total_chars() <= budget);
    }

    #[test]
    fn test_single_oversized_turn_is_kept() {
        let big = "x".repeat(5000);
        let mut history = history_of(&["small", &big]);

        history.evict_to_budget(DEFAULT_CHAR_BUDGET);

        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].content, big);
        assert!(history.total_chars() > DEFAULT_CHAR_BUDGET);
    }

    #[test]
    fn test_eviction_stops_within_budget_or_at_one() {
        for n in 1..40 {
            let contents: Vec<String> = (0..n).map(|i| "y".repeat(50 + i * 37)).collect();
            let refs: Vec<&str> = contents.iter().map(|s| s.as_str()).collect();
            let mut history = history_of(&refs);

            history.evict_to_budget(DEFAULT_CHAR_BUDGET);

            assert!(!history.is_empty());
            assert!(history.total_chars() <= DEFAULT_CHAR_BUDGET || history.len() == 1);
        }
    }

    #[test]
    fn test_malformed_json_is_empty() {
        assert!(ConversationHistory::from_json("not json").is_empty());
        assert!(ConversationHistory::from_json(r#"{"role":"user"}"#).is_empty());
        assert!(ConversationHistory::from_json(r#"[{"role":"system","content":"x"}]"#).is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = Arc::new(InMemoryStore::new());
        let histories = HistoryStore::new(store.clone());

        let mut history = histories.load("100").await;
        assert!(history.is_empty());

        histories.append(&mut history, Turn::user("Hello, my name is Max"));
        histories.append(&mut history, Turn::assistant("Nice to meet you, Max!"));
        histories.persist("100", &history).await.unwrap();

        let loaded = histories.load("100").await;
        assert_eq!(loaded, history);
        assert!(store.get("chat_100").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_multi_chat_isolation() {
        let store = Arc::new(InMemoryStore::new());
        let histories = HistoryStore::new(store);

        histories
            .persist("111", &ConversationHistory::single("Chat 1 message"))
            .await
            .unwrap();
        histories
            .persist("222", &ConversationHistory::single("Chat 2 message"))
            .await
            .unwrap();

        assert!(histories.load("111").await.turns()[0].content.contains("Chat 1"));
        assert!(histories.load("222").await.turns()[0].content.contains("Chat 2"));

        histories.clear("111").await.unwrap();
        assert!(histories.load("111").await.is_empty());
        assert_eq!(histories.load("222").await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_stored_history_loads_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.put("chat_5", "[{broken", None).await.unwrap();

        let histories = HistoryStore::new(store);
        assert!(histories.load("5").await.is_empty());
    }

    #[tokio::test]
    async fn test_append_applies_budget() {
        let store = Arc::new(InMemoryStore::new());
        let histories = HistoryStore::with_limits(store, 120, DEFAULT_TTL);

        let mut history = ConversationHistory::new();
        for i in 0..10 {
            histories.append(&mut history, Turn::user(format!("Message {}", i)));
        }

        assert!(history.total_chars() <= 120);
        assert_eq!(history.turns().last().unwrap().content, "Message 9");
    }
}
