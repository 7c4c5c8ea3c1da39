pub mod keys;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub words: sled::Tree,
    pub word_progress: sled::Tree,
    pub progress_due_index: sled::Tree,
    pub quiz_sessions: sled::Tree,
    pub quiz_answers: sled::Tree,
    pub learning_streaks: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
}

impl StoreError {
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &str, key: &str) -> Self {
        Self::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Transient store failures are safe to retry; NotFound/Validation/
    /// Conflict describe the request itself and are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sled(_))
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let words = db.open_tree(trees::WORDS)?;
        let word_progress = db.open_tree(trees::WORD_PROGRESS)?;
        let progress_due_index = db.open_tree(trees::PROGRESS_DUE_INDEX)?;
        let quiz_sessions = db.open_tree(trees::QUIZ_SESSIONS)?;
        let quiz_answers = db.open_tree(trees::QUIZ_ANSWERS)?;
        let learning_streaks = db.open_tree(trees::LEARNING_STREAKS)?;

        Ok(Self {
            db,
            users,
            words,
            word_progress,
            progress_due_index,
            quiz_sessions,
            quiz_answers,
            learning_streaks,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
