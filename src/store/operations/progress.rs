use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::collections::HashSet;

use crate::store::keys;
use crate::store::operations::users::UserAccount;
use crate::store::{Store, StoreError};

/// Per-(user, word) mastery record. `mastery_level` is always the value the
/// tier policy computes from the attempt counters; it is stored for query
/// convenience, never mutated independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub user_id: String,
    pub word_id: String,
    pub mastery_level: MasteryLevel,
    pub correct_attempts: u32,
    pub total_attempts: u32,
    pub last_review_date: Option<DateTime<Utc>>,
    pub next_review_date: Option<DateTime<Utc>>,
    pub repetition_interval: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Shown,
    Learning,
    Practicing,
    Mastered,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MasteryHistogram {
    pub shown: u64,
    pub learning: u64,
    pub practicing: u64,
    pub mastered: u64,
}

fn due_index_key_for_record(record: &ProgressRecord) -> Result<Option<String>, StoreError> {
    match record.next_review_date {
        Some(next_review_date) => Ok(Some(keys::due_index_key(
            &record.user_id,
            next_review_date.timestamp_millis(),
            &record.word_id,
        )?)),
        None => Ok(None),
    }
}

impl Store {
    pub fn get_progress(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let key = keys::progress_key(user_id, word_id)?;
        match self.word_progress.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write a progress record and keep the due index in step: the stale
    /// index entry for the previous `next_review_date` is removed in the
    /// same transaction that inserts the new one.
    pub fn set_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        let key = keys::progress_key(&record.user_id, &record.word_id)?;
        let value = Self::serialize(record)?;
        let next_due_index_key = due_index_key_for_record(record)?;

        (&self.word_progress, &self.progress_due_index)
            .transaction(|(tx_progress, tx_due_index)| {
                if let Some(old_raw) = tx_progress.get(key.as_bytes())? {
                    let old_record: ProgressRecord =
                        serde_json::from_slice(&old_raw).map_err(|error| {
                            sled::transaction::ConflictableTransactionError::Abort(
                                StoreError::Serialization(error),
                            )
                        })?;
                    if let Some(old_due_index_key) = due_index_key_for_record(&old_record)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?
                    {
                        tx_due_index.remove(old_due_index_key.as_bytes())?;
                    }
                }

                tx_progress.insert(key.as_bytes(), value.as_slice())?;

                if let Some(due_index_key) = &next_due_index_key {
                    tx_due_index.insert(due_index_key.as_bytes(), &[])?;
                }

                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;

        Ok(())
    }

    /// Progress write plus user-counter update as one atomic unit. Used when
    /// an attempt crosses into mastered and bumps `total_words_learned`;
    /// a concurrent reader must never see one without the other.
    pub fn set_progress_and_user(
        &self,
        record: &ProgressRecord,
        user: &UserAccount,
    ) -> Result<(), StoreError> {
        let progress_key = keys::progress_key(&record.user_id, &record.word_id)?;
        let progress_bytes = Self::serialize(record)?;
        let next_due_index_key = due_index_key_for_record(record)?;
        let user_key = keys::user_key(&user.id)?;
        let user_bytes = Self::serialize(user)?;

        (
            &self.word_progress,
            &self.progress_due_index,
            &self.users,
        )
            .transaction(|(tx_progress, tx_due_index, tx_users)| {
                if let Some(old_raw) = tx_progress.get(progress_key.as_bytes())? {
                    let old_record: ProgressRecord =
                        serde_json::from_slice(&old_raw).map_err(|error| {
                            sled::transaction::ConflictableTransactionError::Abort(
                                StoreError::Serialization(error),
                            )
                        })?;
                    if let Some(old_due_index_key) = due_index_key_for_record(&old_record)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?
                    {
                        tx_due_index.remove(old_due_index_key.as_bytes())?;
                    }
                }

                tx_progress.insert(progress_key.as_bytes(), progress_bytes.as_slice())?;

                if let Some(due_index_key) = &next_due_index_key {
                    tx_due_index.insert(due_index_key.as_bytes(), &[])?;
                }

                tx_users.insert(user_key.as_bytes(), user_bytes.as_slice())?;

                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;

        Ok(())
    }

    /// Records whose `next_review_date` has passed, most overdue first.
    /// Index entries are cross-checked against the primary record so a
    /// stale entry (lost to a crash between transactions) is skipped
    /// rather than served.
    pub fn get_due_progress(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let prefix = keys::due_index_prefix(user_id)?;
        let now = Utc::now().timestamp_millis().max(0);
        let mut due = Vec::with_capacity(limit);
        let mut seen_word_ids = HashSet::new();

        for item in self.progress_due_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let Some((due_ts_ms, word_id)) = keys::parse_due_index_item_key(&key) else {
                continue;
            };

            if due_ts_ms > now {
                break;
            }

            if let Some(record) = self.get_progress(user_id, &word_id)? {
                if let Some(next_review_date) = record.next_review_date {
                    let record_due_ts_ms = next_review_date.timestamp_millis().max(0);
                    if record_due_ts_ms == due_ts_ms
                        && record_due_ts_ms <= now
                        && seen_word_ids.insert(word_id)
                    {
                        due.push(record);
                        if due.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }

        Ok(due)
    }

    pub fn mastery_histogram(&self, user_id: &str) -> Result<MasteryHistogram, StoreError> {
        let prefix = keys::progress_prefix(user_id)?;
        let mut histogram = MasteryHistogram::default();
        for item in self.word_progress.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            let record: ProgressRecord = Self::deserialize(&v)?;
            match record.mastery_level {
                MasteryLevel::Shown => histogram.shown += 1,
                MasteryLevel::Learning => histogram.learning += 1,
                MasteryLevel::Practicing => histogram.practicing += 1,
                MasteryLevel::Mastered => histogram.mastered += 1,
            }
        }
        Ok(histogram)
    }

    /// Count used by the learned-words reconciliation: shown, practicing
    /// and mastered records qualify.
    pub fn count_learned_progress(&self, user_id: &str) -> Result<u64, StoreError> {
        let prefix = keys::progress_prefix(user_id)?;
        let mut count = 0u64;
        for item in self.word_progress.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            let record: ProgressRecord = Self::deserialize(&v)?;
            if matches!(
                record.mastery_level,
                MasteryLevel::Shown | MasteryLevel::Practicing | MasteryLevel::Mastered
            ) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn list_user_progress(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        let prefix = keys::progress_prefix(user_id)?;
        let mut records = Vec::new();
        for item in self.word_progress.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            records.push(Self::deserialize::<ProgressRecord>(&v)?);
        }
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// Account-deletion cascade for the progress side: removes every
    /// progress record and due-index entry belonging to the user.
    pub fn delete_user_progress(&self, user_id: &str) -> Result<u64, StoreError> {
        let progress_prefix = keys::progress_prefix(user_id)?;
        let mut progress_keys: Vec<Vec<u8>> = Vec::new();
        for item in self.word_progress.scan_prefix(progress_prefix.as_bytes()) {
            let (k, _) = item?;
            progress_keys.push(k.to_vec());
        }

        let due_prefix = keys::due_index_prefix(user_id)?;
        let mut due_keys: Vec<Vec<u8>> = Vec::new();
        for item in self.progress_due_index.scan_prefix(due_prefix.as_bytes()) {
            let (k, _) = item?;
            due_keys.push(k.to_vec());
        }

        let removed = progress_keys.len() as u64;

        (&self.word_progress, &self.progress_due_index)
            .transaction(|(tx_progress, tx_due_index)| {
                for k in &progress_keys {
                    tx_progress.remove(k.as_slice())?;
                }
                for k in &due_keys {
                    tx_due_index.remove(k.as_slice())?;
                }
                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn mock_progress(user_id: &str, word_id: &str, total_attempts: u32) -> ProgressRecord {
        ProgressRecord {
            user_id: user_id.to_string(),
            word_id: word_id.to_string(),
            mastery_level: MasteryLevel::Learning,
            correct_attempts: total_attempts.min(1),
            total_attempts,
            last_review_date: Some(Utc::now()),
            next_review_date: None,
            repetition_interval: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn get_due_progress_returns_asc_order_and_respects_limit() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("due-order").to_str().unwrap()).unwrap();

        let now = Utc::now();
        let mut w1 = mock_progress("u1", "w1", 1);
        w1.next_review_date = Some(now - Duration::minutes(5));
        let mut w2 = mock_progress("u1", "w2", 1);
        w2.next_review_date = Some(now - Duration::minutes(1));
        let mut w3 = mock_progress("u1", "w3", 1);
        w3.next_review_date = Some(now - Duration::minutes(3));
        let mut w4 = mock_progress("u1", "w4", 1);
        w4.next_review_date = Some(now + Duration::minutes(1));

        store.set_progress(&w1).unwrap();
        store.set_progress(&w2).unwrap();
        store.set_progress(&w3).unwrap();
        store.set_progress(&w4).unwrap();

        let due = store.get_due_progress("u1", 2).unwrap();

        assert_eq!(due.len(), 2);
        assert_eq!(due[0].word_id, "w1");
        assert_eq!(due[1].word_id, "w3");
    }

    #[test]
    fn get_due_progress_uses_latest_review_date_after_update() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("due-update").to_str().unwrap()).unwrap();

        let now = Utc::now();
        let mut record = mock_progress("u1", "w1", 1);
        record.next_review_date = Some(now - Duration::minutes(5));
        store.set_progress(&record).unwrap();

        record.next_review_date = Some(now - Duration::minutes(1));
        store.set_progress(&record).unwrap();

        let due = store.get_due_progress("u1", 10).unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].word_id, "w1");
        assert_eq!(due[0].next_review_date, record.next_review_date);
    }

    #[test]
    fn records_without_review_date_never_become_due() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("due-none").to_str().unwrap()).unwrap();

        let mut shown = mock_progress("u1", "w1", 0);
        shown.mastery_level = MasteryLevel::Shown;
        shown.correct_attempts = 0;
        shown.last_review_date = None;
        store.set_progress(&shown).unwrap();

        assert!(store.get_due_progress("u1", 10).unwrap().is_empty());
    }

    #[test]
    fn histogram_counts_by_level() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("histogram").to_str().unwrap()).unwrap();

        let mut shown = mock_progress("u1", "w1", 0);
        shown.mastery_level = MasteryLevel::Shown;
        let mut mastered = mock_progress("u1", "w2", 10);
        mastered.mastery_level = MasteryLevel::Mastered;
        let learning = mock_progress("u1", "w3", 2);

        store.set_progress(&shown).unwrap();
        store.set_progress(&mastered).unwrap();
        store.set_progress(&learning).unwrap();

        let histogram = store.mastery_histogram("u1").unwrap();
        assert_eq!(histogram.shown, 1);
        assert_eq!(histogram.learning, 1);
        assert_eq!(histogram.mastered, 1);
        assert_eq!(histogram.practicing, 0);
    }

    #[test]
    fn delete_user_progress_clears_due_index_too() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("cascade").to_str().unwrap()).unwrap();

        let mut record = mock_progress("u1", "w1", 1);
        record.next_review_date = Some(Utc::now() - Duration::minutes(2));
        store.set_progress(&record).unwrap();

        assert_eq!(store.delete_user_progress("u1").unwrap(), 1);
        assert!(store.get_progress("u1", "w1").unwrap().is_none());
        assert!(store.get_due_progress("u1", 10).unwrap().is_empty());
    }
}
