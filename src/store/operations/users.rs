use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// The account row carries the denormalized learning counters. They are
/// derived caches over progress/session/streak history; every mutation path
/// recomputes or edge-bumps them inside the same transaction as the
/// triggering write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub total_words_learned: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_quizzes_taken: u64,
    pub average_quiz_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(id: &str, username: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            username: username.to_string(),
            total_words_learned: 0,
            current_streak: 0,
            longest_streak: 0,
            total_quizzes_taken: 0,
            average_quiz_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Store {
    pub fn create_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id)?;

        // CAS so two concurrent creates with the same id cannot both win.
        let cas_result = self
            .users
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(user)?),
            )
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::conflict("user", &user.id));
        }

        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        let key = keys::user_key(user_id)?;
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_user(&self, user_id: &str) -> Result<UserAccount, StoreError> {
        self.get_user(user_id)?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    pub fn update_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id)?;
        if self.users.get(key.as_bytes())?.is_none() {
            return Err(StoreError::not_found("user", &user.id));
        }
        self.users.insert(key.as_bytes(), Self::serialize(user)?)?;
        Ok(())
    }
}
