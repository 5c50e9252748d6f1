//! crates/litera_core/src/tracker.rs
//!
//! The session tracker: start/end/cancel reading sessions, streak status,
//! and the one-time streak recovery. This is an explicit context object
//! handed the authenticated user id on every call; it owns no global
//! state and talks to storage only through the `ReadingStore` port.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ActiveSession, Badge, ReadingSession, SessionOutcome, StreakProfile};
use crate::ports::{CompletedSession, PortError, PortResult, ProfilePatch, ReadingStore};
use crate::streak;

/// A user's streak fields together with the recovery availability flag.
#[derive(Debug, Clone)]
pub struct StreakStatus {
    pub profile: StreakProfile,
    pub can_recover: bool,
}

#[derive(Clone)]
pub struct ReadingTracker {
    store: Arc<dyn ReadingStore>,
}

impl ReadingTracker {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    /// Starts a reading session at the given page. Any previously active
    /// session for this user is silently replaced without being recorded.
    /// The profile's reading-now indicator points at the book until the
    /// session ends or is cancelled.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        current_page: i32,
        now: DateTime<Utc>,
    ) -> PortResult<ActiveSession> {
        if current_page < 0 {
            return Err(PortError::Conflict(
                "current page cannot be negative".to_string(),
            ));
        }
        self.store.get_or_create_profile(user_id).await?;
        let session = ActiveSession {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            start_page: current_page,
            started_at: now,
        };
        self.store.start_active_session(&session).await?;
        info!("User {} started reading book {}", user_id, book_id);
        Ok(session)
    }

    /// Ends the active session: records it, moves the bookmark, updates
    /// the cumulative totals and the streak, emits an activity post, and
    /// awards a streak badge when a threshold is first reached.
    ///
    /// All persistence except the badge award happens in one store
    /// transaction keyed by the session id, so a retried call cannot
    /// leave partial state or duplicate rows. A badge failure is logged
    /// and reported as "no badge"; it never fails the session.
    pub async fn end_session(
        &self,
        user_id: Uuid,
        end_page: i32,
        notes: Option<String>,
        tz_offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> PortResult<SessionOutcome> {
        let active = self
            .store
            .get_active_session(user_id)
            .await?
            .ok_or_else(|| {
                PortError::NotFound(format!("No active reading session for user {}", user_id))
            })?;

        if end_page < active.start_page {
            return Err(PortError::Conflict(format!(
                "end page {} is before the session's start page {}",
                end_page, active.start_page
            )));
        }

        let pages_read = end_page - active.start_page;
        let elapsed_seconds = now.signed_duration_since(active.started_at).num_seconds();
        let duration_minutes = (elapsed_seconds.max(0) as f64 / 60.0).round() as i64;

        let profile = self.store.get_or_create_profile(user_id).await?;

        // The streak counts local calendar days, so the day boundary comes
        // from the reader's UTC offset, not from UTC itself.
        let today = streak::local_today(now, tz_offset_minutes);
        let (day_start, day_end) = streak::local_day_bounds(today, tz_offset_minutes);
        let minutes_already_today = self
            .store
            .minutes_read_between(user_id, day_start, day_end)
            .await?;
        let total_minutes_today = minutes_already_today + duration_minutes;

        let update = streak::advance(&profile, today, total_minutes_today);
        let streak_fields = update.fields().cloned();
        let streak_days = streak_fields
            .as_ref()
            .map(|f| f.streak_days)
            .unwrap_or(profile.streak_days);

        let session = ReadingSession {
            id: active.id,
            user_id,
            book_id: active.book_id,
            start_page: active.start_page,
            end_page,
            pages_read,
            duration_minutes,
            notes: notes.clone(),
            started_at: active.started_at,
        };
        let post_content = notes.unwrap_or_else(|| {
            format!("Read {} pages in {} minutes!", pages_read, duration_minutes)
        });

        self.store
            .complete_session(&CompletedSession {
                session: session.clone(),
                profile_patch: ProfilePatch {
                    pages_delta: i64::from(pages_read),
                    minutes_delta: duration_minutes,
                    streak: streak_fields.clone(),
                },
                post_content,
            })
            .await?;
        info!(
            "User {} finished a session: {} pages in {} minutes (streak {})",
            user_id, pages_read, duration_minutes, streak_days
        );

        // Only a streak that just moved can cross a threshold for the
        // first time; an unchanged streak was already checked when it
        // last changed.
        let new_badge = match &streak_fields {
            Some(fields) => self.award_streak_badge(user_id, fields.streak_days).await,
            None => None,
        };

        Ok(SessionOutcome {
            session,
            streak_days,
            new_badge,
        })
    }

    /// Discards the active session without recording anything. Clearing
    /// when no session is active is a no-op.
    pub async fn cancel_session(&self, user_id: Uuid) -> PortResult<()> {
        self.store.clear_active_session(user_id).await
    }

    /// The session currently in progress, if any.
    pub async fn active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>> {
        self.store.get_active_session(user_id).await
    }

    pub async fn streak_status(&self, user_id: Uuid) -> PortResult<StreakStatus> {
        let profile = self.store.get_or_create_profile(user_id).await?;
        let can_recover = streak::can_recover(&profile);
        Ok(StreakStatus {
            profile,
            can_recover,
        })
    }

    /// Applies the one-time streak recovery. Rejected with `Conflict`
    /// whenever no broken streak is saved or a recovery was already used
    /// since the last natural extension.
    pub async fn recover_streak(
        &self,
        user_id: Uuid,
        tz_offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> PortResult<StreakStatus> {
        let profile = self.store.get_or_create_profile(user_id).await?;
        let today = streak::local_today(now, tz_offset_minutes);
        let fields = streak::recover(&profile, today).ok_or_else(|| {
            PortError::Conflict("streak recovery is not available".to_string())
        })?;
        self.store.apply_recovery(user_id, &fields).await?;
        info!(
            "User {} recovered their streak to {} days",
            user_id, fields.streak_days
        );

        let updated = StreakProfile {
            streak_days: fields.streak_days,
            last_reading_date: Some(fields.last_reading_date),
            last_broken_streak: fields.last_broken_streak,
            consecutive_recoveries: fields.consecutive_recoveries,
            ..profile
        };
        let can_recover = streak::can_recover(&updated);
        Ok(StreakStatus {
            profile: updated,
            can_recover,
        })
    }

    /// Awards the badge for an exactly-hit streak threshold, if any.
    /// Returns `None` on a miss, when the user already holds the badge,
    /// when the catalog has no such row, or on any store failure.
    async fn award_streak_badge(&self, user_id: Uuid, streak_days: i32) -> Option<Badge> {
        let name = streak::badge_for_streak(streak_days)?;
        let badge = match self.store.find_badge(name).await {
            Ok(Some(badge)) => badge,
            Ok(None) => return None,
            Err(e) => {
                warn!("Badge lookup for '{}' failed: {}", name, e);
                return None;
            }
        };
        match self.store.award_badge(user_id, badge.id).await {
            Ok(Some(_)) => {
                info!("Awarded badge '{}' to user {}", badge.name, user_id);
                Some(badge)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to award badge '{}': {}", badge.name, e);
                None
            }
        }
    }
}
