use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Days before `today` still considered when counting a streak.
pub const STREAK_WINDOW_DAYS: i64 = 60;

/// One stored answer: which user answered on which day, within a single room.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseRecord {
    pub day: NaiveDate,
    pub user_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerStatus {
    pub day: NaiveDate,
    pub answer_count: usize,
    pub both_answered: bool,
}

fn users_by_day(records: &[ResponseRecord]) -> BTreeMap<NaiveDate, BTreeSet<&str>> {
    let mut days: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        days.entry(record.day)
            .or_default()
            .insert(record.user_id.as_str());
    }
    days
}

/// Consecutive days, counted back from the most recent answered day in the
/// window, on which at least two distinct users answered.
pub fn compute_streak(records: &[ResponseRecord], today: NaiveDate) -> u32 {
    let window_start = today
        .checked_sub_signed(Duration::days(STREAK_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);
    let days = users_by_day(records);

    let mut recent = days.range(window_start..=today).rev();
    let Some((first_day, first_users)) = recent.next() else {
        return 0;
    };
    if first_users.len() < 2 {
        return 0;
    }

    let mut streak = 1;
    let mut expected = *first_day;
    for (day, users) in recent {
        expected = match expected.pred_opt() {
            Some(prev) => prev,
            None => break,
        };
        if *day != expected || users.len() < 2 {
            break;
        }
        streak += 1;
    }
    tracing::debug!(streak, last_day = %first_day, "computed streak");
    streak
}

pub fn answer_status(records: &[ResponseRecord], day: NaiveDate) -> AnswerStatus {
    let answer_count = records
        .iter()
        .filter(|record| record.day == day)
        .map(|record| record.user_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    AnswerStatus {
        day,
        answer_count,
        both_answered: answer_count >= 2,
    }
}
