use chrono::Utc;
use uuid::Uuid;

use crate::engine::Engine;
use crate::store::operations::quiz_sessions::{
    QuizAnswer, QuizSession, QuizType, SessionStatus,
};
use crate::store::operations::streaks::{ActivityDelta, StreakDay};
use crate::store::StoreError;
use crate::validation::{
    answers_match, validate_answer_fields, validate_time_spent_secs, validate_total_questions,
};

fn session_score(correct_answers: u32, total_questions: u32) -> f64 {
    if total_questions == 0 {
        return 0.0;
    }
    f64::from(correct_answers) / f64::from(total_questions) * 100.0
}

impl Engine {
    pub fn start_session(
        &self,
        user_id: &str,
        quiz_type: QuizType,
        total_questions: u32,
    ) -> Result<QuizSession, StoreError> {
        if let Err(msg) = validate_total_questions(total_questions) {
            return Err(StoreError::Validation(msg.to_string()));
        }

        self.store().require_user(user_id)?;

        let now = Utc::now();
        let session = QuizSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            quiz_type,
            status: SessionStatus::Created,
            total_questions,
            correct_answers: 0,
            score: 0.0,
            time_spent_secs: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store().create_quiz_session(&session)?;

        tracing::debug!(user_id, session_id = %session.id, ?quiz_type, "Quiz session started");
        Ok(session)
    }

    /// Record one answered question. Progress for the word is recorded here,
    /// once per answer, whether or not the session is ever finished.
    pub fn record_answer(
        &self,
        session_id: &str,
        word_id: &str,
        user_answer: &str,
        correct_answer: &str,
        answer_time_ms: u32,
    ) -> Result<QuizAnswer, StoreError> {
        let session = self.store().require_quiz_session(session_id)?;

        let lock = self.user_lock(&session.user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Re-read under the lock; another request may have finished the
        // session in the meantime.
        let mut session = self.store().require_quiz_session(session_id)?;
        if session.status == SessionStatus::Completed {
            return Err(StoreError::conflict("quiz_session", session_id));
        }
        if let Err(msg) = validate_answer_fields(user_answer, correct_answer) {
            return Err(StoreError::Validation(msg.to_string()));
        }

        let user = self.store().require_user(&session.user_id)?;
        self.store().require_word(word_id)?;

        let answered = self.store().count_session_answers(session_id)?;
        if answered >= session.total_questions {
            return Err(StoreError::Validation(format!(
                "session already has all {} answers",
                session.total_questions
            )));
        }

        let now = Utc::now();
        let is_correct = answers_match(user_answer, correct_answer);

        let previous = self.store().get_progress(&session.user_id, word_id)?;
        let outcome =
            self.plan_attempt(&user, word_id, previous.as_ref(), is_correct, now);

        session.status = SessionStatus::Answering;
        if is_correct {
            session.correct_answers += 1;
        }
        session.score = session_score(session.correct_answers, session.total_questions);
        session.updated_at = now;

        let answer = QuizAnswer {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            word_id: word_id.to_string(),
            user_answer: user_answer.to_string(),
            correct_answer: correct_answer.to_string(),
            is_correct,
            answer_time_ms,
            created_at: now,
        };

        self.store().append_answer_with_progress(
            &answer,
            answered,
            &session,
            &outcome.record,
            outcome.updated_user.as_ref(),
        )?;

        if outcome.updated_user.is_some() {
            self.store().merge_streak_day(
                &session.user_id,
                now.date_naive(),
                ActivityDelta {
                    words_learned: 1,
                    ..ActivityDelta::default()
                },
            )?;
            self.recompute_streaks_inner(&session.user_id)?;
        }

        Ok(answer)
    }

    /// Finalize a session. The answers were each recorded through
    /// `record_answer`, so finishing only closes the session and refreshes
    /// the user's quiz aggregates. No progress replay (the original
    /// double-application is deliberately not reproduced).
    pub fn finish_session(
        &self,
        session_id: &str,
        time_spent_secs: u32,
    ) -> Result<QuizSession, StoreError> {
        let session = self.store().require_quiz_session(session_id)?;

        let lock = self.user_lock(&session.user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut session = self.store().require_quiz_session(session_id)?;
        if session.status == SessionStatus::Completed {
            return Err(StoreError::conflict("quiz_session", session_id));
        }
        if let Err(msg) = validate_time_spent_secs(time_spent_secs) {
            return Err(StoreError::Validation(msg.to_string()));
        }

        let now = Utc::now();
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        session.time_spent_secs = Some(time_spent_secs);
        session.updated_at = now;

        // Quiz aggregates are a materialized view over completed sessions:
        // recomputed from the rows, not incremented blindly.
        let mut scores: Vec<f64> = self
            .store()
            .list_user_sessions(&session.user_id)?
            .into_iter()
            .filter(|s| s.status == SessionStatus::Completed && s.id != session.id)
            .map(|s| s.score)
            .collect();
        scores.push(session.score);

        let mut user = self.store().require_user(&session.user_id)?;
        user.total_quizzes_taken = scores.len() as u64;
        user.average_quiz_score = scores.iter().sum::<f64>() / scores.len() as f64;
        user.updated_at = now;

        // The merge is read-modify-write, but the user lock already orders
        // it against other writers; the transaction below makes session,
        // counters and streak row land together.
        let today = now.date_naive();
        let mut streak_day = self
            .store()
            .get_streak_day(&session.user_id, today)?
            .unwrap_or_else(|| StreakDay::empty(&session.user_id, today));
        streak_day.apply(ActivityDelta {
            quizzes_taken: 1,
            time_spent_minutes: (f64::from(time_spent_secs) / 60.0).round() as u32,
            ..ActivityDelta::default()
        });

        self.store()
            .finish_session_writes(&session, &user, &streak_day)?;
        self.recompute_streaks_inner(&session.user_id)?;

        tracing::info!(
            session_id,
            user_id = %session.user_id,
            score = session.score,
            "Quiz session completed"
        );
        Ok(session)
    }

    pub fn session_answers(&self, session_id: &str) -> Result<Vec<QuizAnswer>, StoreError> {
        self.store().require_quiz_session(session_id)?;
        self.store().list_session_answers(session_id)
    }

    /// Completed sessions, most recent first.
    pub fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<QuizSession>, StoreError> {
        self.store().require_user(user_id)?;
        let mut sessions: Vec<QuizSession> = self
            .store()
            .list_user_sessions(user_id)?
            .into_iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .collect();
        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        sessions.truncate(limit);
        Ok(sessions)
    }
}
