//! Pure streak computation over a habit's completion history.
//!
//! Inputs are distinct calendar days (multiple completions on one day have
//! already been collapsed by the `completed_day` column). Both functions are
//! recomputed from the full history on every completion; O(history) per call
//! is fine for the small per-habit histories we expect, and a bounded
//! lookback window remains the escape hatch for very long-lived habits.

use chrono::NaiveDate;

/// Streak ending at or touching `today`. Broken (0) if the most recent
/// completion is more than one day before `today`.
pub fn current_streak(days: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut sorted: Vec<NaiveDate> = days.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let Some(&last) = sorted.last() else {
        return 0;
    };
    if (today - last).num_days() > 1 {
        return 0;
    }

    let mut streak = 1u32;
    let mut cursor = last;
    for &day in sorted.iter().rev().skip(1) {
        let gap = (cursor - day).num_days();
        if gap == 1 {
            streak += 1;
            cursor = day;
        } else if gap == 0 {
            continue;
        } else {
            break;
        }
    }
    streak
}

/// Longest run of consecutive days anywhere in the history.
pub fn longest_streak(days: &[NaiveDate]) -> u32 {
    let mut sorted: Vec<NaiveDate> = days.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    if sorted.is_empty() {
        return 0;
    }

    let mut max_streak = 1u32;
    let mut run = 1u32;
    for pair in sorted.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        if gap == 1 {
            run += 1;
            max_streak = max_streak.max(run);
        } else if gap > 1 {
            run = 1;
        }
    }
    max_streak
}

/// True iff the last completion was exactly yesterday: the streak is alive
/// but dies at midnight without a completion today.
pub fn streak_at_risk(days: &[NaiveDate], today: NaiveDate) -> bool {
    days.iter()
        .max()
        .map(|&last| (today - last).num_days() == 1)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const TODAY: &str = "2026-08-25";

    #[test]
    fn test_empty_history() {
        assert_eq!(current_streak(&[], d(TODAY)), 0);
        assert_eq!(longest_streak(&[]), 0);
        assert!(!streak_at_risk(&[], d(TODAY)));
    }

    #[test]
    fn test_single_completion_today() {
        let days = vec![d(TODAY)];
        assert_eq!(current_streak(&days, d(TODAY)), 1);
        assert_eq!(longest_streak(&days), 1);
    }

    #[test]
    fn test_same_day_twice_counts_once() {
        let days = vec![d(TODAY), d(TODAY)];
        assert_eq!(current_streak(&days, d(TODAY)), 1);
        assert_eq!(longest_streak(&days), 1);
    }

    #[test]
    fn test_yesterday_and_today() {
        let days = vec![d("2026-08-24"), d(TODAY)];
        assert_eq!(current_streak(&days, d(TODAY)), 2);
        assert_eq!(longest_streak(&days), 2);
    }

    #[test]
    fn test_stale_history_breaks_current_streak() {
        // Last completion three days ago: history exists, streak is dead.
        let days = vec![d("2026-08-22")];
        assert_eq!(current_streak(&days, d(TODAY)), 0);
        assert_eq!(longest_streak(&days), 1);
    }

    #[test]
    fn test_internal_gap_resets_longest_run() {
        let days = vec![d("2026-08-20"), d("2026-08-22")];
        assert_eq!(longest_streak(&days), 1);
        assert_eq!(current_streak(&days, d(TODAY)), 0);
    }

    #[test]
    fn test_streak_ending_yesterday_still_counts() {
        let days = vec![d("2026-08-22"), d("2026-08-23"), d("2026-08-24")];
        assert_eq!(current_streak(&days, d(TODAY)), 3);
        assert!(streak_at_risk(&days, d(TODAY)));
    }

    #[test]
    fn test_longest_run_in_the_middle() {
        let days = vec![
            d("2026-08-10"),
            d("2026-08-11"),
            d("2026-08-12"),
            d("2026-08-13"),
            d("2026-08-20"),
            d(TODAY),
        ];
        assert_eq!(longest_streak(&days), 4);
        assert_eq!(current_streak(&days, d(TODAY)), 1);
    }

    #[test]
    fn test_current_never_exceeds_longest() {
        let histories: Vec<Vec<NaiveDate>> = vec![
            vec![],
            vec![d(TODAY)],
            vec![d("2026-08-24"), d(TODAY)],
            vec![d("2026-08-21"), d("2026-08-22"), d("2026-08-24"), d(TODAY)],
            vec![d("2026-08-19"), d("2026-08-22")],
        ];
        for days in histories {
            assert!(current_streak(&days, d(TODAY)) <= longest_streak(&days).max(0));
        }
    }

    #[test]
    fn test_at_risk_only_when_last_was_yesterday() {
        assert!(streak_at_risk(&[d("2026-08-24")], d(TODAY)));
        assert!(!streak_at_risk(&[d(TODAY)], d(TODAY)));
        assert!(!streak_at_risk(&[d("2026-08-22")], d(TODAY)));
    }
}
