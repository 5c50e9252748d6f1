//! crates/litera_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// The in-progress reading session for one user.
///
/// There is at most one per user; starting a new session silently replaces
/// any previous one without recording it. The row is persisted server-side
/// so a page reload or a second device sees the same state, and its `id`
/// becomes the immutable session record's id when the session ends, which
/// makes a retried end call a no-op instead of a duplicate.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub start_page: i32,
    pub started_at: DateTime<Utc>,
}

/// One finished reading session. Immutable once written.
#[derive(Debug, Clone)]
pub struct ReadingSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub start_page: i32,
    pub end_page: i32,
    pub pages_read: i32,
    pub duration_minutes: i64,
    pub notes: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// The per-user profile fields owned by the streak calculator, plus the
/// cumulative reading totals updated at session end.
#[derive(Debug, Clone)]
pub struct StreakProfile {
    pub user_id: Uuid,
    pub streak_days: i32,
    pub last_reading_date: Option<NaiveDate>,
    /// Length of the most recently broken streak, kept so it can be
    /// restored once via the recovery action.
    pub last_broken_streak: i32,
    /// 0 or 1. Set to 1 when a recovery is used; cleared the next time
    /// the streak extends naturally.
    pub consecutive_recoveries: i32,
    pub total_pages_read: i64,
    pub total_reading_time: i64,
    /// The "reading now" indicator shown to other users.
    pub reading_book_id: Option<Uuid>,
}

/// A book a user has logged.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub page_count: Option<i32>,
}

/// A book on a user's shelf together with their bookmark.
#[derive(Debug, Clone)]
pub struct UserBook {
    pub book: Book,
    pub current_page: i32,
}

/// A row from the static badge catalog.
#[derive(Debug, Clone)]
pub struct Badge {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// An awarded badge. At most one exists per (user, badge) pair.
#[derive(Debug, Clone)]
pub struct UserBadge {
    pub user_id: Uuid,
    pub badge_id: Uuid,
    pub awarded_at: DateTime<Utc>,
}

/// An activity feed entry, emitted when a session ends.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub session_id: Option<Uuid>,
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the caller gets back from ending a session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: ReadingSession,
    pub streak_days: i32,
    pub new_badge: Option<Badge>,
}
