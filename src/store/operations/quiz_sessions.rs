use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::users::UserAccount;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub id: String,
    pub user_id: String,
    pub quiz_type: QuizType,
    pub status: SessionStatus,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub score: f64,
    pub time_spent_secs: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    Vocabulary,
    Translation,
    MultipleChoice,
    Flashcard,
    Mixed,
}

/// The lifecycle is linear; a completed session never accepts answers or a
/// second finish.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Answering,
    Completed,
}

/// Immutable once written; owned by its parent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub id: String,
    pub session_id: String,
    pub word_id: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub answer_time_ms: u32,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn create_quiz_session(&self, session: &QuizSession) -> Result<(), StoreError> {
        let key = keys::quiz_session_key(&session.id)?;
        let index_key = keys::quiz_session_user_index(&session.user_id, &session.id)?;
        let session_bytes = Self::serialize(session)?;

        let key_bytes = key.as_bytes().to_vec();
        let index_key_bytes = index_key.as_bytes().to_vec();
        self.quiz_sessions
            .transaction(move |tx| {
                tx.insert(key_bytes.as_slice(), session_bytes.as_slice())?;
                tx.insert(index_key_bytes.as_slice(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => StoreError::Sled(
                    sled::Error::Unsupported("transaction aborted".into()),
                ),
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(())
    }

    pub fn get_quiz_session(&self, session_id: &str) -> Result<Option<QuizSession>, StoreError> {
        let key = keys::quiz_session_key(session_id)?;
        match self.quiz_sessions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_quiz_session(&self, session_id: &str) -> Result<QuizSession, StoreError> {
        self.get_quiz_session(session_id)?
            .ok_or_else(|| StoreError::not_found("quiz_session", session_id))
    }

    /// Answer row and the session's updated counters land atomically; a
    /// concurrent stats read never sees one without the other.
    pub fn append_answer_and_update_session(
        &self,
        answer: &QuizAnswer,
        seq: u32,
        session: &QuizSession,
    ) -> Result<(), StoreError> {
        let answer_key = keys::quiz_answer_key(&answer.session_id, seq)?;
        let answer_bytes = Self::serialize(answer)?;
        let session_key = keys::quiz_session_key(&session.id)?;
        let session_bytes = Self::serialize(session)?;

        (&self.quiz_answers, &self.quiz_sessions)
            .transaction(|(tx_answers, tx_sessions)| {
                if tx_answers.get(answer_key.as_bytes())?.is_some() {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(
                        StoreError::conflict("quiz_answer", &answer_key),
                    ));
                }
                tx_answers.insert(answer_key.as_bytes(), answer_bytes.as_slice())?;
                tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;
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

    /// One quiz answer with all of its side effects (the answer row, the
    /// session counters, the word's progress record with its due-index move,
    /// and, on a mastered crossing, the user's learned-words counter) in a
    /// single transaction.
    pub fn append_answer_with_progress(
        &self,
        answer: &QuizAnswer,
        seq: u32,
        session: &QuizSession,
        progress: &crate::store::operations::progress::ProgressRecord,
        updated_user: Option<&UserAccount>,
    ) -> Result<(), StoreError> {
        let answer_key = keys::quiz_answer_key(&answer.session_id, seq)?;
        let answer_bytes = Self::serialize(answer)?;
        let session_key = keys::quiz_session_key(&session.id)?;
        let session_bytes = Self::serialize(session)?;

        let progress_key = keys::progress_key(&progress.user_id, &progress.word_id)?;
        let progress_bytes = Self::serialize(progress)?;
        let next_due_index_key = progress
            .next_review_date
            .map(|next_review_date| {
                keys::due_index_key(
                    &progress.user_id,
                    next_review_date.timestamp_millis(),
                    &progress.word_id,
                )
            })
            .transpose()?;

        let user_payload = match updated_user {
            Some(user) => Some((keys::user_key(&user.id)?, Self::serialize(user)?)),
            None => None,
        };

        (
            &self.quiz_answers,
            &self.quiz_sessions,
            &self.word_progress,
            &self.progress_due_index,
            &self.users,
        )
            .transaction(
                |(tx_answers, tx_sessions, tx_progress, tx_due_index, tx_users)| {
                    if tx_answers.get(answer_key.as_bytes())?.is_some() {
                        return Err(sled::transaction::ConflictableTransactionError::Abort(
                            StoreError::conflict("quiz_answer", &answer_key),
                        ));
                    }
                    tx_answers.insert(answer_key.as_bytes(), answer_bytes.as_slice())?;
                    tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;

                    if let Some(old_raw) = tx_progress.get(progress_key.as_bytes())? {
                        let old_record: crate::store::operations::progress::ProgressRecord =
                            serde_json::from_slice(&old_raw).map_err(|error| {
                                sled::transaction::ConflictableTransactionError::Abort(
                                    StoreError::Serialization(error),
                                )
                            })?;
                        if let Some(old_due_index_key) = old_record
                            .next_review_date
                            .map(|next_review_date| {
                                keys::due_index_key(
                                    &old_record.user_id,
                                    next_review_date.timestamp_millis(),
                                    &old_record.word_id,
                                )
                            })
                            .transpose()
                            .map_err(sled::transaction::ConflictableTransactionError::Abort)?
                        {
                            tx_due_index.remove(old_due_index_key.as_bytes())?;
                        }
                    }

                    tx_progress.insert(progress_key.as_bytes(), progress_bytes.as_slice())?;

                    if let Some(due_index_key) = &next_due_index_key {
                        tx_due_index.insert(due_index_key.as_bytes(), &[])?;
                    }

                    if let Some((user_key, user_bytes)) = &user_payload {
                        tx_users.insert(user_key.as_bytes(), user_bytes.as_slice())?;
                    }

                    Ok(())
                },
            )
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

    /// Session finalization as one atomic unit: the completed session, the
    /// user's recomputed quiz counters, and the merged streak row for the
    /// day. Either all three land or none are observed.
    pub fn finish_session_writes(
        &self,
        session: &QuizSession,
        user: &UserAccount,
        streak_day: &crate::store::operations::streaks::StreakDay,
    ) -> Result<(), StoreError> {
        let session_key = keys::quiz_session_key(&session.id)?;
        let session_bytes = Self::serialize(session)?;
        let user_key = keys::user_key(&user.id)?;
        let user_bytes = Self::serialize(user)?;
        let streak_key = keys::streak_key(&streak_day.user_id, streak_day.date)?;
        let streak_bytes = Self::serialize(streak_day)?;

        (&self.quiz_sessions, &self.users, &self.learning_streaks)
            .transaction(|(tx_sessions, tx_users, tx_streaks)| {
                tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;
                tx_users.insert(user_key.as_bytes(), user_bytes.as_slice())?;
                tx_streaks.insert(streak_key.as_bytes(), streak_bytes.as_slice())?;
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

    /// Answers in ask order (the key embeds the sequence number).
    pub fn list_session_answers(&self, session_id: &str) -> Result<Vec<QuizAnswer>, StoreError> {
        let prefix = keys::quiz_answer_prefix(session_id)?;
        let mut answers = Vec::new();
        for item in self.quiz_answers.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            answers.push(Self::deserialize::<QuizAnswer>(&v)?);
        }
        Ok(answers)
    }

    pub fn count_session_answers(&self, session_id: &str) -> Result<u32, StoreError> {
        let prefix = keys::quiz_answer_prefix(session_id)?;
        let mut count = 0u32;
        for item in self.quiz_answers.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn list_user_sessions(&self, user_id: &str) -> Result<Vec<QuizSession>, StoreError> {
        let prefix = keys::quiz_session_user_prefix(user_id)?;
        let mut sessions = Vec::new();
        for item in self.quiz_sessions.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let key_str = String::from_utf8(k.to_vec()).unwrap_or_default();
            if let Some(session_id) = key_str.rsplit(':').next() {
                if let Some(session) = self.get_quiz_session(session_id)? {
                    sessions.push(session);
                }
            }
        }
        Ok(sessions)
    }

    /// Account-deletion cascade for the quiz side: sessions, their index
    /// entries and all owned answers.
    pub fn delete_user_sessions(&self, user_id: &str) -> Result<u64, StoreError> {
        let sessions = self.list_user_sessions(user_id)?;
        let mut removed = 0u64;
        for session in &sessions {
            let answer_prefix = keys::quiz_answer_prefix(&session.id)?;
            let mut answer_keys: Vec<Vec<u8>> = Vec::new();
            for item in self.quiz_answers.scan_prefix(answer_prefix.as_bytes()) {
                let (k, _) = item?;
                answer_keys.push(k.to_vec());
            }

            let session_key = keys::quiz_session_key(&session.id)?;
            let index_key = keys::quiz_session_user_index(user_id, &session.id)?;

            (&self.quiz_sessions, &self.quiz_answers)
                .transaction(|(tx_sessions, tx_answers)| {
                    tx_sessions.remove(session_key.as_bytes())?;
                    tx_sessions.remove(index_key.as_bytes())?;
                    for k in &answer_keys {
                        tx_answers.remove(k.as_slice())?;
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
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_session(id: &str, user_id: &str) -> QuizSession {
        let now = Utc::now();
        QuizSession {
            id: id.to_string(),
            user_id: user_id.to_string(),
            quiz_type: QuizType::Vocabulary,
            status: SessionStatus::Created,
            total_questions: 5,
            correct_answers: 0,
            score: 0.0,
            time_spent_secs: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_answer(session_id: &str, word_id: &str, is_correct: bool) -> QuizAnswer {
        QuizAnswer {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            word_id: word_id.to_string(),
            user_answer: "hund".to_string(),
            correct_answer: "hund".to_string(),
            is_correct,
            answer_time_ms: 1200,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_list_user_sessions() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("sessions-db").to_str().unwrap()).unwrap();

        store.create_quiz_session(&sample_session("s1", "u1")).unwrap();
        store.create_quiz_session(&sample_session("s2", "u1")).unwrap();
        store.create_quiz_session(&sample_session("s3", "u2")).unwrap();

        let sessions = store.list_user_sessions("u1").unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn answers_come_back_in_ask_order() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-db").to_str().unwrap()).unwrap();

        let mut session = sample_session("s1", "u1");
        store.create_quiz_session(&session).unwrap();

        for (seq, word) in ["w3", "w1", "w2"].iter().enumerate() {
            let answer = sample_answer("s1", word, true);
            session.correct_answers += 1;
            store
                .append_answer_and_update_session(&answer, seq as u32, &session)
                .unwrap();
        }

        let answers = store.list_session_answers("s1").unwrap();
        let word_ids: Vec<&str> = answers.iter().map(|a| a.word_id.as_str()).collect();
        assert_eq!(word_ids, vec!["w3", "w1", "w2"]);
        assert_eq!(store.count_session_answers("s1").unwrap(), 3);
    }

    #[test]
    fn duplicate_answer_sequence_conflicts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("answers-dup").to_str().unwrap()).unwrap();

        let session = sample_session("s1", "u1");
        store.create_quiz_session(&session).unwrap();

        let answer = sample_answer("s1", "w1", true);
        store
            .append_answer_and_update_session(&answer, 0, &session)
            .unwrap();
        let err = store
            .append_answer_and_update_session(&answer, 0, &session)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn delete_user_sessions_removes_answers() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("sessions-del").to_str().unwrap()).unwrap();

        let session = sample_session("s1", "u1");
        store.create_quiz_session(&session).unwrap();
        store
            .append_answer_and_update_session(&sample_answer("s1", "w1", true), 0, &session)
            .unwrap();

        assert_eq!(store.delete_user_sessions("u1").unwrap(), 1);
        assert!(store.get_quiz_session("s1").unwrap().is_none());
        assert!(store.list_session_answers("s1").unwrap().is_empty());
        assert!(store.list_user_sessions("u1").unwrap().is_empty());
    }
}
