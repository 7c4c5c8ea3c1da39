use chrono::{Duration, Utc};
use serde::Serialize;

use crate::engine::Engine;
use crate::store::operations::progress::MasteryHistogram;
use crate::store::operations::quiz_sessions::{QuizSession, SessionStatus};
use crate::store::operations::streaks::StreakDay;
use crate::store::StoreError;

/// Read-side rollup for the dashboard. Composed from the aggregate counters,
/// the progress store and the streak history; a user with no history gets
/// zeroed counters and empty lists, never an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub username: String,
    pub total_words_learned: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_quizzes_taken: u64,
    pub average_quiz_score: f64,
    pub mastery: MasteryHistogram,
    pub recent_sessions: Vec<QuizSession>,
    pub recent_streaks: Vec<StreakDay>,
}

const RECENT_SESSION_WINDOW_DAYS: i64 = 7;

impl Engine {
    /// 组合用户聚合计数、掌握度直方图、近期测验和打卡历史；纯读操作。
    pub fn user_stats(&self, user_id: &str) -> Result<UserStats, StoreError> {
        let user = self.store().require_user(user_id)?;
        let now = Utc::now();

        let mastery = self.store().mastery_histogram(user_id)?;

        let window_start = now - Duration::days(RECENT_SESSION_WINDOW_DAYS);
        let mut recent_sessions: Vec<QuizSession> = self
            .store()
            .list_user_sessions(user_id)?
            .into_iter()
            .filter(|s| {
                s.status == SessionStatus::Completed
                    && s.completed_at.map(|at| at >= window_start).unwrap_or(false)
            })
            .collect();
        recent_sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        recent_sessions.truncate(self.limits().recent_sessions_limit);

        let history_start = now.date_naive()
            - Duration::days(self.limits().streak_history_days.saturating_sub(1));
        let recent_streaks = self.store().streak_days_since(user_id, history_start)?;

        // The learned-words figure served to clients is the reconciled one,
        // so counter drift never shows a smaller number than the records
        // support.
        let total_words_learned = user
            .total_words_learned
            .max(self.store().count_learned_progress(user_id)?);

        Ok(UserStats {
            user_id: user.id,
            username: user.username,
            total_words_learned,
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
            total_quizzes_taken: user.total_quizzes_taken,
            average_quiz_score: user.average_quiz_score,
            mastery,
            recent_sessions,
            recent_streaks,
        })
    }
}
