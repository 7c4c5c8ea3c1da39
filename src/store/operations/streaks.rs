use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// One calendar day of learning activity for a user. Rows accumulate:
/// repeated activity on the same day merges additively into the existing
/// row, never overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakDay {
    pub user_id: String,
    pub date: NaiveDate,
    pub words_learned: u32,
    pub quizzes_taken: u32,
    pub time_spent_minutes: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityDelta {
    pub words_learned: u32,
    pub quizzes_taken: u32,
    pub time_spent_minutes: u32,
}

impl StreakDay {
    pub fn empty(user_id: &str, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            words_learned: 0,
            quizzes_taken: 0,
            time_spent_minutes: 0,
            is_active: true,
        }
    }

    pub fn apply(&mut self, delta: ActivityDelta) {
        self.words_learned = self.words_learned.saturating_add(delta.words_learned);
        self.quizzes_taken = self.quizzes_taken.saturating_add(delta.quizzes_taken);
        self.time_spent_minutes = self
            .time_spent_minutes
            .saturating_add(delta.time_spent_minutes);
        self.is_active = true;
    }
}

impl Store {
    /// Additive upsert. The read-merge-write runs inside a sled transaction
    /// so two same-day activities cannot drop each other's deltas.
    pub fn merge_streak_day(
        &self,
        user_id: &str,
        date: NaiveDate,
        delta: ActivityDelta,
    ) -> Result<StreakDay, StoreError> {
        let key = keys::streak_key(user_id, date)?;

        self.learning_streaks
            .transaction(|tx| {
                let mut day = match tx.get(key.as_bytes())? {
                    Some(raw) => serde_json::from_slice::<StreakDay>(&raw).map_err(|error| {
                        sled::transaction::ConflictableTransactionError::Abort(
                            StoreError::Serialization(error),
                        )
                    })?,
                    None => StreakDay::empty(user_id, date),
                };

                day.apply(delta);

                let bytes = serde_json::to_vec(&day).map_err(|error| {
                    sled::transaction::ConflictableTransactionError::Abort(
                        StoreError::Serialization(error),
                    )
                })?;
                tx.insert(key.as_bytes(), bytes)?;
                Ok(day)
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )
    }

    pub fn get_streak_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<StreakDay>, StoreError> {
        let key = keys::streak_key(user_id, date)?;
        match self.learning_streaks.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All active streak rows for a user, ascending by date (the key embeds
    /// the ISO date, so the prefix scan is already ordered).
    pub fn list_active_streak_days(&self, user_id: &str) -> Result<Vec<StreakDay>, StoreError> {
        let prefix = keys::streak_prefix(user_id)?;
        let mut days = Vec::new();
        for item in self.learning_streaks.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            let day: StreakDay = Self::deserialize(&v)?;
            if day.is_active {
                days.push(day);
            }
        }
        Ok(days)
    }

    pub fn streak_days_since(
        &self,
        user_id: &str,
        from: NaiveDate,
    ) -> Result<Vec<StreakDay>, StoreError> {
        let start = keys::streak_key(user_id, from)?;
        let prefix = keys::streak_prefix(user_id)?;
        let mut days = Vec::new();
        for item in self.learning_streaks.range(start.as_bytes()..) {
            let (k, v) = item?;
            if !k.starts_with(prefix.as_bytes()) {
                break;
            }
            days.push(Self::deserialize::<StreakDay>(&v)?);
        }
        Ok(days)
    }

    pub fn delete_user_streaks(&self, user_id: &str) -> Result<u64, StoreError> {
        let prefix = keys::streak_prefix(user_id)?;
        let mut keys_to_remove: Vec<Vec<u8>> = Vec::new();
        for item in self.learning_streaks.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            keys_to_remove.push(k.to_vec());
        }
        for k in &keys_to_remove {
            self.learning_streaks.remove(k.as_slice())?;
        }
        Ok(keys_to_remove.len() as u64)
    }
}
