//! crates/litera_core/src/streak.rs
//!
//! The consecutive-day streak calculator. Pure calendar arithmetic over a
//! user's `StreakProfile`: the caller supplies "today" as a local calendar
//! date and the cumulative minutes read on that day, and gets back the new
//! streak field values (or nothing, when the day does not move the streak).

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::domain::StreakProfile;

/// A calendar day only counts toward the streak once the user's cumulative
/// reading time for that local day reaches this many minutes. Summing per
/// day (rather than per session) lets several short sessions jointly
/// satisfy the requirement, while a trivial one-minute read does not.
pub const DAILY_MINUTES_THRESHOLD: i64 = 10;

/// Streak lengths that earn a badge, matched exactly.
const BADGE_THRESHOLDS: &[(i32, &str)] = &[
    (1, "Good Start"),
    (3, "Warming Up"),
    (7, "Dedicated Reader"),
    (14, "Committed Reader"),
    (30, "Iron Habit"),
];

/// Returns the badge name earned at exactly `streak_days`, if any.
pub fn badge_for_streak(streak_days: i32) -> Option<&'static str> {
    BADGE_THRESHOLDS
        .iter()
        .find(|(days, _)| *days == streak_days)
        .map(|(_, name)| *name)
}

/// The new streak field values produced by [`advance`] or [`recover`],
/// ready to be persisted on the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakFields {
    pub streak_days: i32,
    pub last_reading_date: NaiveDate,
    pub last_broken_streak: i32,
    pub consecutive_recoveries: i32,
}

/// The outcome of running the calculator for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreakUpdate {
    /// Below the daily threshold, or today was already credited.
    Unchanged,
    /// The streak moved; persist these field values.
    Changed(StreakFields),
}

impl StreakUpdate {
    pub fn fields(&self) -> Option<&StreakFields> {
        match self {
            StreakUpdate::Unchanged => None,
            StreakUpdate::Changed(fields) => Some(fields),
        }
    }
}

/// Advances the streak for `today` given the cumulative minutes read on
/// that local day (including the session that just ended).
///
/// - Under [`DAILY_MINUTES_THRESHOLD`] total minutes: no change.
/// - Today already credited: no change (a second qualifying session on the
///   same day must not increment the streak again).
/// - Last credited day was yesterday: the streak extends by one, and the
///   recovery lockout (`consecutive_recoveries`) clears.
/// - Anything else (gap of two or more days, or no prior date): the streak
///   restarts at 1, saving the old length into `last_broken_streak` so it
///   stays eligible for a one-time recovery.
pub fn advance(
    profile: &StreakProfile,
    today: NaiveDate,
    total_minutes_today: i64,
) -> StreakUpdate {
    if total_minutes_today < DAILY_MINUTES_THRESHOLD {
        return StreakUpdate::Unchanged;
    }
    if profile.last_reading_date == Some(today) {
        return StreakUpdate::Unchanged;
    }

    let yesterday = today - Duration::days(1);
    if profile.last_reading_date == Some(yesterday) {
        StreakUpdate::Changed(StreakFields {
            streak_days: profile.streak_days + 1,
            last_reading_date: today,
            last_broken_streak: profile.last_broken_streak,
            // A natural extension re-arms recovery.
            consecutive_recoveries: 0,
        })
    } else {
        StreakUpdate::Changed(StreakFields {
            streak_days: 1,
            last_reading_date: today,
            last_broken_streak: if profile.streak_days > 0 {
                profile.streak_days
            } else {
                profile.last_broken_streak
            },
            consecutive_recoveries: profile.consecutive_recoveries,
        })
    }
}

/// Whether the one-time recovery action is currently available.
pub fn can_recover(profile: &StreakProfile) -> bool {
    profile.last_broken_streak > 0 && profile.consecutive_recoveries == 0
}

/// Applies the one-time streak recovery: restores the broken streak's
/// length on top of the current streak and locks recovery out until the
/// next natural extension. Returns `None` when recovery is unavailable.
///
/// This is a manual transition independent of session completion; it does
/// not re-run [`advance`].
pub fn recover(profile: &StreakProfile, today: NaiveDate) -> Option<StreakFields> {
    if !can_recover(profile) {
        return None;
    }
    Some(StreakFields {
        streak_days: profile.streak_days + profile.last_broken_streak,
        last_reading_date: today,
        last_broken_streak: 0,
        consecutive_recoveries: 1,
    })
}

/// The reader's local calendar date, given their offset from UTC in
/// minutes (east positive). Reading at 23:30 in UTC+2 must credit that
/// local day, not the UTC one.
pub fn local_today(now: DateTime<Utc>, tz_offset_minutes: i32) -> NaiveDate {
    (now + Duration::minutes(i64::from(tz_offset_minutes))).date_naive()
}

/// The UTC instants bounding a local calendar day, as a half-open
/// `[start, end)` range suitable for querying stored sessions.
pub fn local_day_bounds(
    day: NaiveDate,
    tz_offset_minutes: i32,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = day.and_time(NaiveTime::MIN);
    let start = Utc.from_utc_datetime(&(local_midnight - Duration::minutes(i64::from(tz_offset_minutes))));
    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn profile(
        streak_days: i32,
        last_reading_date: Option<NaiveDate>,
        last_broken_streak: i32,
        consecutive_recoveries: i32,
    ) -> StreakProfile {
        StreakProfile {
            user_id: Uuid::new_v4(),
            streak_days,
            last_reading_date,
            last_broken_streak,
            consecutive_recoveries,
            total_pages_read: 0,
            total_reading_time: 0,
            reading_book_id: None,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn below_threshold_leaves_streak_untouched() {
        let p = profile(5, Some(day("2024-03-09")), 0, 0);
        assert_eq!(advance(&p, day("2024-03-10"), 9), StreakUpdate::Unchanged);
    }

    #[test]
    fn extension_from_yesterday_increments_and_rearms_recovery() {
        let p = profile(6, Some(day("2024-03-09")), 0, 1);
        let update = advance(&p, day("2024-03-10"), 15);
        assert_eq!(
            update,
            StreakUpdate::Changed(StreakFields {
                streak_days: 7,
                last_reading_date: day("2024-03-10"),
                last_broken_streak: 0,
                consecutive_recoveries: 0,
            })
        );
    }

    #[test]
    fn same_day_second_session_is_a_no_op() {
        let p = profile(7, Some(day("2024-03-10")), 0, 0);
        assert_eq!(advance(&p, day("2024-03-10"), 45), StreakUpdate::Unchanged);
    }

    #[test]
    fn gap_breaks_streak_and_saves_it_for_recovery() {
        let p = profile(4, Some(day("2024-03-07")), 0, 0);
        let update = advance(&p, day("2024-03-10"), 12);
        assert_eq!(
            update,
            StreakUpdate::Changed(StreakFields {
                streak_days: 1,
                last_reading_date: day("2024-03-10"),
                last_broken_streak: 4,
                consecutive_recoveries: 0,
            })
        );
    }

    #[test]
    fn first_ever_qualifying_day_starts_at_one() {
        let p = profile(0, None, 0, 0);
        let update = advance(&p, day("2024-03-10"), 10);
        let fields = update.fields().expect("streak should start");
        assert_eq!(fields.streak_days, 1);
        assert_eq!(fields.last_broken_streak, 0);
    }

    #[test]
    fn restart_keeps_older_broken_streak_when_current_is_zero() {
        // Streak already reset to 0 elsewhere; the saved broken streak
        // must not be clobbered by a fresh start.
        let p = profile(0, Some(day("2024-03-01")), 6, 0);
        let update = advance(&p, day("2024-03-10"), 20);
        assert_eq!(update.fields().unwrap().last_broken_streak, 6);
    }

    #[test]
    fn exactly_ten_minutes_counts() {
        let p = profile(1, Some(day("2024-03-09")), 0, 0);
        assert!(advance(&p, day("2024-03-10"), 10).fields().is_some());
    }

    #[test]
    fn badge_thresholds_match_exactly() {
        assert_eq!(badge_for_streak(1), Some("Good Start"));
        assert_eq!(badge_for_streak(3), Some("Warming Up"));
        assert_eq!(badge_for_streak(7), Some("Dedicated Reader"));
        assert_eq!(badge_for_streak(14), Some("Committed Reader"));
        assert_eq!(badge_for_streak(30), Some("Iron Habit"));
        assert_eq!(badge_for_streak(8), None);
        assert_eq!(badge_for_streak(0), None);
    }

    #[test]
    fn recovery_gating() {
        assert!(can_recover(&profile(1, None, 6, 0)));
        assert!(!can_recover(&profile(1, None, 0, 0)));
        assert!(!can_recover(&profile(1, None, 6, 1)));
    }

    #[test]
    fn recovery_restores_and_locks_out() {
        let p = profile(1, Some(day("2024-03-10")), 6, 0);
        let fields = recover(&p, day("2024-03-10")).expect("recovery available");
        assert_eq!(fields.streak_days, 7);
        assert_eq!(fields.last_broken_streak, 0);
        assert_eq!(fields.consecutive_recoveries, 1);

        // A second attempt before any natural extension is rejected.
        let after = profile(7, Some(day("2024-03-10")), 0, 1);
        assert!(recover(&after, day("2024-03-10")).is_none());
    }

    #[test]
    fn local_day_respects_timezone_offset() {
        // 23:30 UTC on the 9th is already the 10th in UTC+2.
        let now = "2024-03-09T23:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(local_today(now, 120), day("2024-03-10"));
        assert_eq!(local_today(now, 0), day("2024-03-09"));
        // ...and still the 9th in UTC-5.
        assert_eq!(local_today(now, -300), day("2024-03-09"));
    }

    #[test]
    fn local_day_bounds_are_half_open_utc_instants() {
        let (start, end) = local_day_bounds(day("2024-03-10"), 120);
        assert_eq!(start, "2024-03-09T22:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(end, "2024-03-10T22:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
