//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use litera_core::domain::{Badge, Post, ReadingSession, UserBook};
use litera_core::ports::{NewBook, PortError};
use litera_core::tracker::StreakStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        start_session_handler,
        end_session_handler,
        cancel_session_handler,
        active_session_handler,
        list_sessions_handler,
        streak_handler,
        recover_streak_handler,
        list_badges_handler,
        add_book_handler,
        list_books_handler,
        list_posts_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(
            StartSessionRequest,
            EndSessionRequest,
            RecoverRequest,
            AddBookRequest,
            ActiveSessionResponse,
            SessionResponse,
            SessionOutcomeResponse,
            StreakResponse,
            BadgeResponse,
            BookResponse,
            UserBookResponse,
            PostResponse,
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
        )
    ),
    tags(
        (name = "Litera API", description = "API endpoints for reading sessions, streaks, and badges.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct StartSessionRequest {
    pub book_id: Uuid,
    pub current_page: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct EndSessionRequest {
    pub end_page: i32,
    pub notes: Option<String>,
    /// The reader's offset from UTC in minutes (east positive), used to
    /// credit the session to their local calendar day.
    pub tz_offset_minutes: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct RecoverRequest {
    pub tz_offset_minutes: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct AddBookRequest {
    pub title: String,
    pub author: Option<String>,
    pub page_count: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct ActiveSessionResponse {
    pub session_id: Uuid,
    pub book_id: Uuid,
    pub start_page: i32,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub book_id: Uuid,
    pub start_page: i32,
    pub end_page: i32,
    pub pages_read: i32,
    pub duration_minutes: i64,
    pub notes: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl From<ReadingSession> for SessionResponse {
    fn from(session: ReadingSession) -> Self {
        Self {
            session_id: session.id,
            book_id: session.book_id,
            start_page: session.start_page,
            end_page: session.end_page,
            pages_read: session.pages_read,
            duration_minutes: session.duration_minutes,
            notes: session.notes,
            started_at: session.started_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionOutcomeResponse {
    pub session: SessionResponse,
    pub streak_days: i32,
    pub new_badge: Option<BadgeResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct StreakResponse {
    pub streak_days: i32,
    pub last_reading_date: Option<NaiveDate>,
    pub last_broken_streak: i32,
    pub consecutive_recoveries: i32,
    pub total_pages_read: i64,
    pub total_reading_time: i64,
    pub can_recover: bool,
}

impl From<StreakStatus> for StreakResponse {
    fn from(status: StreakStatus) -> Self {
        Self {
            streak_days: status.profile.streak_days,
            last_reading_date: status.profile.last_reading_date,
            last_broken_streak: status.profile.last_broken_streak,
            consecutive_recoveries: status.profile.consecutive_recoveries,
            total_pages_read: status.profile.total_pages_read,
            total_reading_time: status.profile.total_reading_time,
            can_recover: status.can_recover,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BadgeResponse {
    pub badge_id: Uuid,
    pub name: String,
    pub description: String,
}

impl From<Badge> for BadgeResponse {
    fn from(badge: Badge) -> Self {
        Self {
            badge_id: badge.id,
            name: badge.name,
            description: badge.description,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub book_id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub page_count: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct UserBookResponse {
    pub book_id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub page_count: Option<i32>,
    pub current_page: i32,
}

impl From<UserBook> for UserBookResponse {
    fn from(ub: UserBook) -> Self {
        Self {
            book_id: ub.book.id,
            title: ub.book.title,
            author: ub.book.author,
            page_count: ub.book.page_count,
            current_page: ub.current_page,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PostResponse {
    pub post_id: Uuid,
    pub book_id: Uuid,
    pub session_id: Option<Uuid>,
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            post_id: post.id,
            book_id: post.book_id,
            session_id: post.session_id,
            kind: post.kind,
            content: post.content,
            created_at: post.created_at,
        }
    }
}

/// Maps a port error to the HTTP status it should surface as.
fn port_error_response(context: &str, e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("{}: {:?}", context, e);
        (status, context.to_string())
    } else {
        (status, e.to_string())
    }
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Start a reading session.
///
/// Replaces any session already in progress without recording it, and
/// flags the profile as "reading now".
#[utoipa::path(
    post,
    path = "/sessions/start",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started", body = ActiveSessionResponse),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Negative start page"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .tracker
        .start_session(user_id, req.book_id, req.current_page, Utc::now())
        .await
        .map_err(|e| port_error_response("Failed to start session", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ActiveSessionResponse {
            session_id: session.id,
            book_id: session.book_id,
            start_page: session.start_page,
            started_at: session.started_at,
        }),
    ))
}

/// End the active reading session.
///
/// Records the session, moves the bookmark, updates totals and the streak,
/// emits an activity post, and reports any newly earned badge.
#[utoipa::path(
    post,
    path = "/sessions/end",
    request_body = EndSessionRequest,
    responses(
        (status = 200, description = "Session recorded", body = SessionOutcomeResponse),
        (status = 404, description = "No active session"),
        (status = 409, description = "End page before start page"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<EndSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = state
        .tracker
        .end_session(
            user_id,
            req.end_page,
            req.notes,
            req.tz_offset_minutes.unwrap_or(0),
            Utc::now(),
        )
        .await
        .map_err(|e| port_error_response("Failed to end session", e))?;

    Ok(Json(SessionOutcomeResponse {
        session: outcome.session.into(),
        streak_days: outcome.streak_days,
        new_badge: outcome.new_badge.map(Into::into),
    }))
}

/// Cancel the active reading session without recording anything.
#[utoipa::path(
    post,
    path = "/sessions/cancel",
    responses(
        (status = 204, description = "Session discarded"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn cancel_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .tracker
        .cancel_session(user_id)
        .await
        .map_err(|e| port_error_response("Failed to cancel session", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// The session currently in progress, if any (lets a reloaded client
/// reconcile instead of losing the session).
#[utoipa::path(
    get,
    path = "/sessions/active",
    responses(
        (status = 200, description = "The active session, or null when none", body = ActiveSessionResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn active_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .tracker
        .active_session(user_id)
        .await
        .map_err(|e| port_error_response("Failed to fetch active session", e))?;

    Ok(Json(session.map(|s| ActiveSessionResponse {
        session_id: s.id,
        book_id: s.book_id,
        start_page: s.start_page,
        started_at: s.started_at,
    })))
}

/// The user's reading session history, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Session history", body = [SessionResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sessions = state
        .store
        .sessions_for_user(user_id)
        .await
        .map_err(|e| port_error_response("Failed to list sessions", e))?;

    Ok(Json(
        sessions
            .into_iter()
            .map(SessionResponse::from)
            .collect::<Vec<_>>(),
    ))
}

//=========================================================================================
// Streak Handlers
//=========================================================================================

/// The user's current streak, totals, and recovery availability.
#[utoipa::path(
    get,
    path = "/streak",
    responses(
        (status = 200, description = "Streak status", body = StreakResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn streak_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = state
        .tracker
        .streak_status(user_id)
        .await
        .map_err(|e| port_error_response("Failed to fetch streak", e))?;
    Ok(Json(StreakResponse::from(status)))
}

/// Restore a broken streak (available at most once until the streak
/// next extends naturally).
#[utoipa::path(
    post,
    path = "/streak/recover",
    request_body = RecoverRequest,
    responses(
        (status = 200, description = "Streak recovered", body = StreakResponse),
        (status = 409, description = "Recovery not available"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn recover_streak_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<RecoverRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = state
        .tracker
        .recover_streak(user_id, req.tz_offset_minutes.unwrap_or(0), Utc::now())
        .await
        .map_err(|e| port_error_response("Failed to recover streak", e))?;
    Ok(Json(StreakResponse::from(status)))
}

//=========================================================================================
// Badge, Book, and Post Handlers
//=========================================================================================

/// The badges the user has earned, oldest first.
#[utoipa::path(
    get,
    path = "/badges",
    responses(
        (status = 200, description = "Earned badges", body = [BadgeResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_badges_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let badges = state
        .store
        .badges_for_user(user_id)
        .await
        .map_err(|e| port_error_response("Failed to list badges", e))?;
    Ok(Json(
        badges.into_iter().map(BadgeResponse::from).collect::<Vec<_>>(),
    ))
}

/// Log a book on the user's shelf.
#[utoipa::path(
    post,
    path = "/books",
    request_body = AddBookRequest,
    responses(
        (status = 201, description = "Book logged", body = BookResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn add_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AddBookRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book = state
        .store
        .add_book(
            user_id,
            &NewBook {
                title: req.title,
                author: req.author,
                page_count: req.page_count,
            },
        )
        .await
        .map_err(|e| port_error_response("Failed to add book", e))?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            book_id: book.id,
            title: book.title,
            author: book.author,
            page_count: book.page_count,
        }),
    ))
}

/// The user's shelf with current bookmarks, newest first.
#[utoipa::path(
    get,
    path = "/books",
    responses(
        (status = 200, description = "The user's books", body = [UserBookResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let books = state
        .store
        .books_for_user(user_id)
        .await
        .map_err(|e| port_error_response("Failed to list books", e))?;
    Ok(Json(
        books
            .into_iter()
            .map(UserBookResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// The user's recent activity posts, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    responses(
        (status = 200, description = "Recent activity", body = [PostResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_posts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let posts = state
        .store
        .posts_for_user(user_id)
        .await
        .map_err(|e| port_error_response("Failed to list posts", e))?;
    Ok(Json(
        posts.into_iter().map(PostResponse::from).collect::<Vec<_>>(),
    ))
}
