// Streak calculation over per-day activity records

use chrono::NaiveDate;

use crate::models::activity::BreakSession;

/// Shortest break that counts as compliant, in minutes
pub const MIN_COMPLIANT_BREAK_MINUTES: i64 = 15;
/// Longest break that counts as compliant, in minutes
pub const MAX_COMPLIANT_BREAK_MINUTES: i64 = 60;

/// Length of the current run of qualifying days, walking back from `anchor`.
///
/// Each qualifying day may sit at most one calendar day before the previous
/// one (the first may be the anchor itself or the day before it, so a day
/// without a record yet does not break the run). The first larger gap ends
/// the walk. Days after the anchor are ignored and several records on the
/// same day count once.
pub fn current_streak<T>(
    records: &[T],
    day_of: impl Fn(&T) -> NaiveDate,
    qualifies: impl Fn(&T) -> bool,
    anchor: NaiveDate,
) -> u32 {
    let mut days: Vec<NaiveDate> = records
        .iter()
        .filter(|r| qualifies(r))
        .map(&day_of)
        .filter(|day| *day <= anchor)
        .collect();

    // Newest first, one entry per day
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();

    let mut streak = 0;
    let mut cursor = anchor;

    for day in days {
        let days_diff = (cursor - day).num_days();
        if days_diff > 1 {
            break;
        }
        streak += 1;
        cursor = day;
    }

    streak
}

/// Number of compliant breaks among the most recent `window` ended sessions.
///
/// This is a count, not a consecutive-day streak: a break is compliant when
/// it lasted between 15 and 60 minutes inclusive, and the sessions do not
/// need to fall on consecutive days. Sessions without an end are skipped.
pub fn compliant_breaks(sessions: &[BreakSession], window: usize) -> u32 {
    let mut ended: Vec<&BreakSession> = sessions.iter().filter(|s| s.ended_at.is_some()).collect();
    ended.sort_unstable_by(|a, b| b.ended_at.cmp(&a.ended_at));

    ended
        .into_iter()
        .take(window)
        .filter(|s| is_compliant(s))
        .count() as u32
}

/// Whether a single ended break falls inside the compliant window.
/// Durations are truncated to whole minutes, so 60m30s still counts.
pub fn is_compliant(session: &BreakSession) -> bool {
    session
        .duration()
        .map(|d| d.num_minutes())
        .is_some_and(|minutes| {
            (MIN_COMPLIANT_BREAK_MINUTES..=MAX_COMPLIANT_BREAK_MINUTES).contains(&minutes)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 12).unwrap()
    }

    fn days_ago(offsets: &[i64]) -> Vec<NaiveDate> {
        offsets.iter().map(|d| anchor() - Duration::days(*d)).collect()
    }

    fn streak(days: &[NaiveDate]) -> u32 {
        current_streak(days, |d| *d, |_| true, anchor())
    }

    fn session(ended_days_ago: i64, minutes: i64) -> BreakSession {
        let ended = Utc.with_ymd_and_hms(2026, 3, 12, 12, 0, 0).unwrap() - Duration::days(ended_days_ago);
        BreakSession {
            employee_id: 1,
            started_at: ended - Duration::minutes(minutes),
            ended_at: Some(ended),
        }
    }

    #[test]
    fn test_empty_records() {
        assert_eq!(streak(&[]), 0);
    }

    #[test]
    fn test_five_consecutive_days() {
        assert_eq!(streak(&days_ago(&[0, 1, 2, 3, 4])), 5);
    }

    #[test]
    fn test_two_day_gap_caps_streak() {
        // Days 5 and 6 missing, so day 7 is not part of the run
        assert_eq!(streak(&days_ago(&[0, 1, 2, 3, 4, 7, 8])), 5);
    }

    #[test]
    fn test_missing_anchor_day_still_counts() {
        assert_eq!(streak(&days_ago(&[1, 2, 3])), 3);
    }

    #[test]
    fn test_stale_records_give_zero() {
        assert_eq!(streak(&days_ago(&[2, 3, 4])), 0);
    }

    #[test]
    fn test_unordered_and_duplicate_days() {
        assert_eq!(streak(&days_ago(&[2, 0, 1, 1, 0])), 3);
    }

    #[test]
    fn test_future_records_ignored() {
        let mut days = days_ago(&[0, 1]);
        days.push(anchor() + Duration::days(3));
        assert_eq!(streak(&days), 2);
    }

    #[test]
    fn test_predicate_filters_records() {
        let records: Vec<(NaiveDate, f64)> = days_ago(&[0, 1, 2, 3])
            .into_iter()
            .zip([95.0, 80.0, 40.0, 99.0])
            .collect();

        let run = current_streak(&records, |r| r.0, |r| r.1 >= 75.0, anchor());
        assert_eq!(run, 2);
    }

    #[test]
    fn test_compliant_break_bounds() {
        assert!(is_compliant(&session(0, 15)));
        assert!(is_compliant(&session(0, 60)));
        assert!(!is_compliant(&session(0, 14)));
        assert!(!is_compliant(&session(0, 61)));
    }

    #[test]
    fn test_compliant_break_whole_minutes() {
        let mut long = session(0, 60);
        long.started_at = long.started_at - Duration::seconds(30);
        assert!(is_compliant(&long));

        let mut short = session(0, 15);
        short.started_at = short.started_at + Duration::seconds(1);
        assert!(!is_compliant(&short));
    }

    #[test]
    fn test_compliant_breaks_counts_recent_window() {
        let sessions = vec![
            session(0, 20),
            session(1, 90),
            session(2, 30),
            session(3, 45),
            session(4, 5),
        ];

        assert_eq!(compliant_breaks(&sessions, 3), 2);
        assert_eq!(compliant_breaks(&sessions, 10), 3);
        assert_eq!(compliant_breaks(&[], 5), 0);
    }

    #[test]
    fn test_open_breaks_skipped() {
        let mut open = session(0, 20);
        open.ended_at = None;
        let sessions = vec![open, session(1, 20)];

        assert_eq!(compliant_breaks(&sessions, 1), 1);
    }
}
