use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::engine::Engine;
use crate::store::operations::progress::{MasteryLevel, ProgressRecord};
use crate::store::operations::streaks::ActivityDelta;
use crate::store::operations::users::UserAccount;
use crate::store::operations::words::WordEntry;
use crate::store::StoreError;

/// Tier thresholds, evaluated in fixed priority order: mastered first,
/// then practicing, then learning. The first match wins.
const MASTERED_MIN_ATTEMPTS: u32 = 10;
const MASTERED_MIN_RATE: f64 = 0.9;
const PRACTICING_MIN_ATTEMPTS: u32 = 5;
const PRACTICING_MIN_RATE: f64 = 0.7;

const MASTERED_INTERVAL_CAP_DAYS: u32 = 30;
const PRACTICING_INTERVAL_CAP_DAYS: u32 = 14;
const LEARNING_INTERVAL_CAP_DAYS: u32 = 7;

/// Mastery is a pure function of the attempt counters. Zero attempts means
/// the word has only been shown.
pub fn mastery_for(correct_attempts: u32, total_attempts: u32) -> MasteryLevel {
    if total_attempts == 0 {
        return MasteryLevel::Shown;
    }
    let success_rate = f64::from(correct_attempts) / f64::from(total_attempts);
    if total_attempts >= MASTERED_MIN_ATTEMPTS && success_rate >= MASTERED_MIN_RATE {
        MasteryLevel::Mastered
    } else if total_attempts >= PRACTICING_MIN_ATTEMPTS && success_rate >= PRACTICING_MIN_RATE {
        MasteryLevel::Practicing
    } else {
        MasteryLevel::Learning
    }
}

fn next_interval(level: MasteryLevel, previous_interval: u32, is_correct: bool) -> u32 {
    let previous = previous_interval.max(1);
    match level {
        MasteryLevel::Mastered => previous
            .saturating_mul(2)
            .min(MASTERED_INTERVAL_CAP_DAYS),
        MasteryLevel::Practicing => (previous.saturating_mul(3) / 2)
            .min(PRACTICING_INTERVAL_CAP_DAYS),
        // Shown never results from an attempt; treat it as the learning tier.
        MasteryLevel::Learning | MasteryLevel::Shown => {
            if is_correct {
                (previous + 1).min(LEARNING_INTERVAL_CAP_DAYS)
            } else {
                previous.saturating_sub(1).max(1)
            }
        }
    }
}

/// Apply one attempt to a record. A brand-new record starts at the fixed
/// one-day interval; an existing record (including a shown-only one) goes
/// through the tier policy.
pub fn apply_attempt(
    existing: Option<&ProgressRecord>,
    user_id: &str,
    word_id: &str,
    is_correct: bool,
    now: DateTime<Utc>,
) -> ProgressRecord {
    match existing {
        None => {
            let correct_attempts = u32::from(is_correct);
            ProgressRecord {
                user_id: user_id.to_string(),
                word_id: word_id.to_string(),
                mastery_level: mastery_for(correct_attempts, 1),
                correct_attempts,
                total_attempts: 1,
                last_review_date: Some(now),
                next_review_date: Some(now + Duration::days(1)),
                repetition_interval: 1,
                updated_at: now,
            }
        }
        Some(previous) => {
            let total_attempts = previous.total_attempts + 1;
            let correct_attempts = previous.correct_attempts + u32::from(is_correct);
            let mastery_level = mastery_for(correct_attempts, total_attempts);
            let repetition_interval =
                next_interval(mastery_level, previous.repetition_interval, is_correct);
            ProgressRecord {
                user_id: previous.user_id.clone(),
                word_id: previous.word_id.clone(),
                mastery_level,
                correct_attempts,
                total_attempts,
                last_review_date: Some(now),
                next_review_date: Some(now + Duration::days(i64::from(repetition_interval))),
                repetition_interval,
                updated_at: now,
            }
        }
    }
}

fn shown_record(user_id: &str, word_id: &str, now: DateTime<Utc>) -> ProgressRecord {
    ProgressRecord {
        user_id: user_id.to_string(),
        word_id: word_id.to_string(),
        mastery_level: MasteryLevel::Shown,
        correct_attempts: 0,
        total_attempts: 0,
        last_review_date: None,
        next_review_date: None,
        repetition_interval: 1,
        updated_at: now,
    }
}

/// Outcome of planning one attempt: the updated record, plus the user row
/// when the attempt crossed into mastered and the learned-words counter was
/// bumped. The bump is edge-triggered: re-practicing an already-mastered
/// word never produces an updated user.
pub(crate) struct AttemptOutcome {
    pub record: ProgressRecord,
    pub updated_user: Option<UserAccount>,
}

/// A due record joined with its catalog entry for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub progress: ProgressRecord,
    pub word: WordEntry,
}

impl Engine {
    pub(crate) fn plan_attempt(
        &self,
        user: &UserAccount,
        word_id: &str,
        previous: Option<&ProgressRecord>,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> AttemptOutcome {
        let was_mastered =
            previous.map(|p| p.mastery_level == MasteryLevel::Mastered).unwrap_or(false);
        let record = apply_attempt(previous, &user.id, word_id, is_correct, now);
        let crossed = record.mastery_level == MasteryLevel::Mastered && !was_mastered;

        let updated_user = if crossed {
            let mut updated = user.clone();
            updated.total_words_learned += 1;
            updated.updated_at = now;
            Some(updated)
        } else {
            None
        };

        AttemptOutcome {
            record,
            updated_user,
        }
    }

    /// Record one real attempt on a word. Each call counts; retries are the
    /// caller's responsibility to deduplicate.
    pub fn record_progress(
        &self,
        user_id: &str,
        word_id: &str,
        is_correct: bool,
    ) -> Result<ProgressRecord, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let user = self.store().require_user(user_id)?;
        self.store().require_word(word_id)?;

        let previous = self.store().get_progress(user_id, word_id)?;
        let now = Utc::now();
        let outcome = self.plan_attempt(&user, word_id, previous.as_ref(), is_correct, now);

        match &outcome.updated_user {
            Some(updated_user) => {
                self.store()
                    .set_progress_and_user(&outcome.record, updated_user)?;
                tracing::debug!(user_id, word_id, "Word crossed into mastered");
                self.store().merge_streak_day(
                    user_id,
                    now.date_naive(),
                    ActivityDelta {
                        words_learned: 1,
                        ..ActivityDelta::default()
                    },
                )?;
                self.recompute_streaks_inner(user_id)?;
            }
            None => self.store().set_progress(&outcome.record)?,
        }

        Ok(outcome.record)
    }

    /// Create `shown` records for words the user has seen but not attempted.
    /// Idempotent: existing records (of any level) are left untouched, and
    /// word ids missing from the catalog are skipped. Returns the number of
    /// records created.
    pub fn mark_shown(&self, user_id: &str, word_ids: &[String]) -> Result<usize, StoreError> {
        if word_ids.len() > self.limits().mark_shown_max_batch {
            return Err(StoreError::Validation(format!(
                "markShown accepts at most {} word ids",
                self.limits().mark_shown_max_batch
            )));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.store().require_user(user_id)?;

        let now = Utc::now();
        let mut created = 0usize;
        for word_id in word_ids {
            if self.store().get_word(word_id)?.is_none() {
                continue;
            }
            if self.store().get_progress(user_id, word_id)?.is_some() {
                continue;
            }
            self.store()
                .set_progress(&shown_record(user_id, word_id, now))?;
            created += 1;
        }

        Ok(created)
    }

    /// Due records joined with their catalog entries, most overdue first.
    pub fn words_for_review(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewItem>, StoreError> {
        let limit = limit
            .unwrap_or(self.limits().review_default_limit)
            .clamp(1, self.limits().review_max_limit);

        self.store().require_user(user_id)?;

        let due = self.store().get_due_progress(user_id, limit)?;
        let mut items = Vec::with_capacity(due.len());
        for progress in due {
            // Catalog rows are never deleted while referenced; skip
            // defensively if one is missing anyway.
            let Some(word) = self.store().get_word(&progress.word_id)? else {
                continue;
            };
            items.push(ReviewItem { progress, word });
        }
        Ok(items)
    }

    /// Learned-word total, reconciled against counter drift: the larger of
    /// the cached counter and the qualifying progress-record count.
    pub fn learned_words_count(&self, user_id: &str) -> Result<u64, StoreError> {
        let user = self.store().require_user(user_id)?;
        let from_progress = self.store().count_learned_progress(user_id)?;
        Ok(user.total_words_learned.max(from_progress))
    }

    pub fn get_progress(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        self.store().get_progress(user_id, word_id)
    }

    pub fn list_progress(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        self.store().require_user(user_id)?;
        self.store().list_user_progress(user_id, limit, offset)
    }
}
