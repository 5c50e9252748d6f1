//! crates/litera_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ActiveSession, Badge, Book, Post, ReadingSession, StreakProfile, UserBadge, UserBook,
};
use crate::streak::StreakFields;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Write Payloads
//=========================================================================================

/// The profile changes to apply when a session completes: cumulative
/// totals always, streak fields only when the calculator moved them.
#[derive(Debug, Clone)]
pub struct ProfilePatch {
    pub pages_delta: i64,
    pub minutes_delta: i64,
    pub streak: Option<StreakFields>,
}

/// Everything `complete_session` persists in one transaction: the
/// immutable session record, the bookmark move, the profile patch, and
/// the activity post. The session's id doubles as the idempotency key.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub session: ReadingSession,
    pub profile_patch: ProfilePatch,
    pub post_content: String,
}

/// A book to log on a user's shelf.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: Option<String>,
    pub page_count: Option<i32>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ReadingStore: Send + Sync {
    // --- Profiles ---
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<StreakProfile>;

    // --- Active session (one per user) ---
    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>>;

    /// Stores the active session, replacing any previous one, and flags
    /// the profile as reading-now.
    async fn start_active_session(&self, session: &ActiveSession) -> PortResult<()>;

    /// Discards the active session and clears the reading-now flag.
    async fn clear_active_session(&self, user_id: Uuid) -> PortResult<()>;

    // --- Session records ---
    /// Sum of `duration_minutes` over sessions with `started_at` in
    /// `[from, to)`.
    async fn minutes_read_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<i64>;

    /// Persists a finished session atomically: session insert (keyed by
    /// the active session's id, so retries are no-ops), bookmark update,
    /// profile patch, active-session cleanup, and the activity post.
    async fn complete_session(&self, completion: &CompletedSession) -> PortResult<()>;

    async fn sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingSession>>;

    // --- Streak recovery ---
    async fn apply_recovery(&self, user_id: Uuid, fields: &StreakFields) -> PortResult<()>;

    // --- Badges ---
    async fn find_badge(&self, name: &str) -> PortResult<Option<Badge>>;

    /// Awards a badge to a user. Returns `None` when the user already
    /// holds it; uniqueness is the store's responsibility, not a
    /// check-then-insert in the caller.
    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid) -> PortResult<Option<UserBadge>>;

    async fn badges_for_user(&self, user_id: Uuid) -> PortResult<Vec<Badge>>;

    // --- Books and posts ---
    async fn add_book(&self, user_id: Uuid, book: &NewBook) -> PortResult<Book>;

    async fn books_for_user(&self, user_id: Uuid) -> PortResult<Vec<UserBook>>;

    async fn posts_for_user(&self, user_id: Uuid) -> PortResult<Vec<Post>>;
}
