//! Access Control
//!
//! Moderation state lives in three store records:
//! - `blocked_users`: JSON array of user ids, silenced entirely
//! - `global_password`: raw secret; absent means the bot is open
//! - `verified_users`: JSON array of user ids who supplied the secret
//!
//! Reads that fail (backend down, corrupt JSON) degrade to "absent", i.e.
//! the least restrictive interpretation. Writes propagate their errors.

use crate::error::StoreError;
use crate::store::SharedStore;
use tracing::{debug, info, warn};

const BLOCKED_USERS_KEY: &str = "blocked_users";
const PASSWORD_KEY: &str = "global_password";
const VERIFIED_USERS_KEY: &str = "verified_users";

/// Result of gating one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Forward as a chat turn
    Allowed,
    /// Drop without replying
    Blocked,
    /// Reply with the password prompt; not a chat turn
    NeedsPassword,
    /// Text matched the password; reply with confirmation; not a chat turn
    PasswordAccepted,
}

/// Gatekeeper over the moderation records
#[derive(Clone)]
pub struct AccessControl {
    store: SharedStore,
}

impl AccessControl {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Decide whether `raw_text` from `user_id` may proceed.
    ///
    /// Admins bypass every check. Only a successful password match writes
    /// to the store.
    pub async fn evaluate(
        &self,
        user_id: &str,
        is_admin: bool,
        raw_text: &str,
    ) -> Result<AccessDecision, StoreError> {
        if is_admin {
            return Ok(AccessDecision::Allowed);
        }

        if self.is_blocked(user_id).await {
            info!("User {} is blocked", user_id);
            return Ok(AccessDecision::Blocked);
        }

        let Some(password) = self.password().await else {
            return Ok(AccessDecision::Allowed);
        };

        let mut verified = self.load_ids(VERIFIED_USERS_KEY).await;
        if verified.iter().any(|id| id == user_id) {
            return Ok(AccessDecision::Allowed);
        }

        if raw_text.trim() == password {
            verified.push(user_id.to_string());
            self.save_ids(VERIFIED_USERS_KEY, &verified).await?;
            info!("User {} supplied the password", user_id);
            Ok(AccessDecision::PasswordAccepted)
        } else {
            debug!("User {} needs the password", user_id);
            Ok(AccessDecision::NeedsPassword)
        }
    }

    /// Whether `user_id` is on the block list
    pub async fn is_blocked(&self, user_id: &str) -> bool {
        self.load_ids(BLOCKED_USERS_KEY)
            .await
            .iter()
            .any(|id| id == user_id)
    }

    /// Add a user to the block list (idempotent)
    pub async fn block(&self, target_user_id: &str) -> Result<(), StoreError> {
        let mut blocked = self.load_ids(BLOCKED_USERS_KEY).await;
        if blocked.iter().any(|id| id == target_user_id) {
            return Ok(());
        }
        blocked.push(target_user_id.to_string());
        self.save_ids(BLOCKED_USERS_KEY, &blocked).await?;
        info!("Blocked user {}", target_user_id);
        Ok(())
    }

    /// Remove a user from the block list (idempotent)
    pub async fn unblock(&self, target_user_id: &str) -> Result<(), StoreError> {
        let mut blocked = self.load_ids(BLOCKED_USERS_KEY).await;
        blocked.retain(|id| id != target_user_id);
        self.save_ids(BLOCKED_USERS_KEY, &blocked).await?;
        info!("Unblocked user {}", target_user_id);
        Ok(())
    }

    /// Install a new password.
    ///
    /// Rotating the password invalidates every earlier verification.
    pub async fn set_password(&self, secret: &str) -> Result<(), StoreError> {
        self.store.put(PASSWORD_KEY, secret, None).await?;
        self.store.delete(VERIFIED_USERS_KEY).await?;
        info!("Password gate enabled");
        Ok(())
    }

    /// Remove the password and every verification.
    ///
    /// Two independent deletes; a failure between them leaves verifications
    /// behind, which are harmless while no password is set.
    pub async fn unset_password(&self) -> Result<(), StoreError> {
        self.store.delete(PASSWORD_KEY).await?;
        self.store.delete(VERIFIED_USERS_KEY).await?;
        info!("Password gate disabled");
        Ok(())
    }

    /// Current password, if one is set
    pub async fn password(&self) -> Option<String> {
        match self.store.get(PASSWORD_KEY).await {
            Ok(value) => value.filter(|p| !p.is_empty()),
            Err(e) => {
                warn!("Failed to read password gate, treating as open: {}", e);
                None
            }
        }
    }

    /// Users verified under the current password
    pub async fn verified_users(&self) -> Vec<String> {
        self.load_ids(VERIFIED_USERS_KEY).await
    }

    async fn load_ids(&self, key: &str) -> Vec<String> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}, treating as empty: {}", key, e);
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Malformed {} record, treating as empty: {}", key, e);
            Vec::new()
        })
    }

    async fn save_ids(&self, key: &str, ids: &[String]) -> Result<(), StoreError> {
        // Serializing a slice of strings cannot fail
        let json = serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string());
        self.store.put(key, &json, None).await
    }
}
