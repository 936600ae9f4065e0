//! crates/reading_tracker_core/src/streak.rs
//!
//! Current and longest reading streaks over a user's qualifying days.
//! Pure functions: no I/O, no clock access.

use chrono::{Duration, NaiveDate};

use crate::domain::StreakStats;

/// Computes both streaks. `days` may be unsorted and contain duplicates.
pub fn calculate_streaks(days: &[NaiveDate], today: NaiveDate) -> StreakStats {
    if days.is_empty() {
        return StreakStats::default();
    }

    StreakStats {
        current_streak: current_streak(days, today),
        longest_streak: longest_streak(days),
    }
}

/// Consecutive days ending today, or ending yesterday when nothing was read yet today.
pub fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut descending: Vec<NaiveDate> = days.iter().copied().filter(|d| *d <= today).collect();
    descending.sort_unstable_by(|a, b| b.cmp(a));
    descending.dedup();

    let yesterday = today - Duration::days(1);
    let anchor = match descending.first() {
        Some(&latest) if latest == today || latest == yesterday => latest,
        _ => return 0,
    };

    let mut streak = 1;
    let mut candidate = anchor - Duration::days(1);
    for &day in &descending[1..] {
        if day != candidate {
            // The next recorded day is older than the one we need: a gap.
            break;
        }
        streak += 1;
        candidate -= Duration::days(1);
    }
    streak
}

/// The longest run of consecutive days anywhere in the history.
pub fn longest_streak(days: &[NaiveDate]) -> u32 {
    let mut ascending = days.to_vec();
    ascending.sort_unstable();

    let mut iter = ascending.into_iter();
    let Some(mut previous) = iter.next() else {
        return 0;
    };

    let mut run = 1;
    let mut longest = 1;
    for day in iter {
        match (day - previous).num_days() {
            0 => continue,
            1 => run += 1,
            _ => run = 1,
        }
        longest = longest.max(run);
        previous = day;
    }
    longest
}
