use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::keys;
use crate::store::{Store, StoreError};
use crate::validation::validate_difficulty_level;

/// One catalog entry: a Swedish↔English translation pair. The catalog is
/// seeded out of band and read-only during engine operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordEntry {
    pub id: String,
    pub swedish: String,
    pub english: String,
    pub word_type: String,
    pub difficulty_level: u8,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_word(&self, word: &WordEntry) -> Result<(), StoreError> {
        if let Err(msg) = validate_difficulty_level(word.difficulty_level) {
            return Err(StoreError::Validation(msg.to_string()));
        }
        let key = keys::word_key(&word.id)?;
        self.words.insert(key.as_bytes(), Self::serialize(word)?)?;
        Ok(())
    }

    pub fn get_word(&self, word_id: &str) -> Result<Option<WordEntry>, StoreError> {
        let key = keys::word_key(word_id)?;
        match self.words.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_word(&self, word_id: &str) -> Result<WordEntry, StoreError> {
        self.get_word(word_id)?
            .ok_or_else(|| StoreError::not_found("word", word_id))
    }

    /// 批量获取单词（仅返回存在的单词）
    pub fn get_words_by_ids(
        &self,
        word_ids: &[String],
    ) -> Result<HashMap<String, WordEntry>, StoreError> {
        let mut words = HashMap::with_capacity(word_ids.len());

        for word_id in word_ids {
            if words.contains_key(word_id) {
                continue;
            }

            if let Some(word) = self.get_word(word_id)? {
                words.insert(word_id.clone(), word);
            }
        }

        Ok(words)
    }

    pub fn count_words(&self) -> Result<u64, StoreError> {
        Ok(self.words.len() as u64)
    }
}
