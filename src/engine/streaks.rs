use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::engine::Engine;
use crate::store::operations::streaks::ActivityDelta;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

/// Walk the activity dates and derive both streak figures in one pass.
///
/// The current streak is the run of consecutive days ending today or
/// yesterday: a day at distance `d` from today only extends it while
/// `d` equals the length walked so far, so any gap breaks the chain. A
/// user who was active yesterday but not yet today still holds their
/// streak. The longest streak is the longest consecutive run anywhere in
/// the history.
pub fn streak_summary(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> StreakSummary {
    if dates.is_empty() {
        return StreakSummary {
            current: 0,
            longest: 0,
        };
    }

    let mut current = 0u32;
    let mut anchor = today;
    if !dates.contains(&anchor) {
        match anchor.pred_opt() {
            Some(yesterday) if dates.contains(&yesterday) => anchor = yesterday,
            _ => anchor = today, // no run to walk; current stays 0
        }
    }
    if dates.contains(&anchor) {
        let mut cursor = anchor;
        while dates.contains(&cursor) {
            current += 1;
            cursor = match cursor.pred_opt() {
                Some(d) => d,
                None => break,
            };
        }
    }

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for date in dates {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*date);
    }

    StreakSummary { current, longest }
}

impl Engine {
    /// Additively record a day of activity, then refresh the derived streak
    /// counters. Runs eagerly on every streak-affecting event, never lazily.
    pub fn record_activity(
        &self,
        user_id: &str,
        date: NaiveDate,
        delta: ActivityDelta,
    ) -> Result<StreakSummary, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.store().require_user(user_id)?;
        self.store().merge_streak_day(user_id, date, delta)?;
        self.recompute_streaks_inner(user_id)
    }

    pub fn recompute_streaks(&self, user_id: &str) -> Result<StreakSummary, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.recompute_streaks_inner(user_id)
    }

    /// Caller must hold the user lock: the recompute reads the full streak
    /// history and overwrites the derived counters, so concurrent triggers
    /// for the same user have to serialize.
    pub(crate) fn recompute_streaks_inner(
        &self,
        user_id: &str,
    ) -> Result<StreakSummary, StoreError> {
        let days = self.store().list_active_streak_days(user_id)?;
        let dates: BTreeSet<NaiveDate> = days.iter().map(|d| d.date).collect();
        let summary = streak_summary(&dates, Utc::now().date_naive());

        let mut user = self.store().require_user(user_id)?;
        user.current_streak = summary.current;
        user.longest_streak = summary.longest;
        user.updated_at = Utc::now();
        self.store().update_user(&user)?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dates(days: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        days.iter().copied().collect()
    }

    #[test]
    fn empty_history_is_zero() {
        let summary = streak_summary(&BTreeSet::new(), date(2024, 3, 10));
        assert_eq!(summary, StreakSummary { current: 0, longest: 0 });
    }

    #[test]
    fn run_ending_today_counts_fully() {
        let today = date(2024, 3, 10);
        let summary = streak_summary(
            &dates(&[date(2024, 3, 8), date(2024, 3, 9), today]),
            today,
        );
        assert_eq!(summary, StreakSummary { current: 3, longest: 3 });
    }

    #[test]
    fn run_ending_yesterday_still_counts() {
        let today = date(2024, 3, 10);
        let summary = streak_summary(&dates(&[date(2024, 3, 8), date(2024, 3, 9)]), today);
        assert_eq!(summary.current, 2);
    }

    #[test]
    fn gap_of_two_days_breaks_current_streak() {
        let today = date(2024, 3, 10);
        let summary = streak_summary(&dates(&[date(2024, 3, 8)]), today);
        assert_eq!(summary.current, 0);
        assert_eq!(summary.longest, 1);
    }

    #[test]
    fn longest_survives_while_current_resets() {
        // Three consecutive days, a two-day gap, then today.
        let today = date(2024, 3, 10);
        let summary = streak_summary(
            &dates(&[
                date(2024, 3, 5),
                date(2024, 3, 6),
                date(2024, 3, 7),
                today,
            ]),
            today,
        );
        assert_eq!(summary, StreakSummary { current: 1, longest: 3 });
    }

    #[test]
    fn longest_spans_month_boundaries() {
        let today = date(2024, 3, 2);
        let summary = streak_summary(
            &dates(&[date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1), today]),
            today,
        );
        assert_eq!(summary, StreakSummary { current: 4, longest: 4 });
    }
}
