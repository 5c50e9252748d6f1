//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ReadingStore` port from the core crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use litera_core::domain::{
    ActiveSession, Badge, Book, Post, ReadingSession, StreakProfile, UserBadge, UserBook,
};
use litera_core::ports::{
    CompletedSession, NewBook, PortError, PortResult, ReadingStore,
};
use litera_core::streak::StreakFields;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ReadingStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    streak_days: i32,
    last_reading_date: Option<NaiveDate>,
    last_broken_streak: i32,
    consecutive_recoveries: i32,
    total_pages_read: i64,
    total_reading_time: i64,
    reading_book_id: Option<Uuid>,
}
impl ProfileRecord {
    fn to_domain(self) -> StreakProfile {
        StreakProfile {
            user_id: self.user_id,
            streak_days: self.streak_days,
            last_reading_date: self.last_reading_date,
            last_broken_streak: self.last_broken_streak,
            consecutive_recoveries: self.consecutive_recoveries,
            total_pages_read: self.total_pages_read,
            total_reading_time: self.total_reading_time,
            reading_book_id: self.reading_book_id,
        }
    }
}

#[derive(FromRow)]
struct ActiveSessionRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    start_page: i32,
    started_at: DateTime<Utc>,
}
impl ActiveSessionRecord {
    fn to_domain(self) -> ActiveSession {
        ActiveSession {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            start_page: self.start_page,
            started_at: self.started_at,
        }
    }
}

#[derive(FromRow)]
struct ReadingSessionRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    start_page: i32,
    end_page: i32,
    pages_read: i32,
    duration_minutes: i64,
    notes: Option<String>,
    started_at: DateTime<Utc>,
}
impl ReadingSessionRecord {
    fn to_domain(self) -> ReadingSession {
        ReadingSession {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            start_page: self.start_page,
            end_page: self.end_page,
            pages_read: self.pages_read,
            duration_minutes: self.duration_minutes,
            notes: self.notes,
            started_at: self.started_at,
        }
    }
}

#[derive(FromRow)]
struct BadgeRecord {
    id: Uuid,
    name: String,
    description: String,
}
impl BadgeRecord {
    fn to_domain(self) -> Badge {
        Badge {
            id: self.id,
            name: self.name,
            description: self.description,
        }
    }
}

#[derive(FromRow)]
struct PostRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    session_id: Option<Uuid>,
    kind: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl PostRecord {
    fn to_domain(self) -> Post {
        Post {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            session_id: self.session_id,
            kind: self.kind,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    author: Option<String>,
    page_count: Option<i32>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            page_count: self.page_count,
        }
    }
}

//=========================================================================================
// `ReadingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReadingStore for DbAdapter {
    async fn get_or_create_profile(&self, user_id: Uuid) -> PortResult<StreakProfile> {
        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, streak_days, last_reading_date, last_broken_streak, \
             consecutive_recoveries, total_pages_read, total_reading_time, reading_book_id \
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Profile {} not found", user_id))
            }
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>> {
        let record = sqlx::query_as::<_, ActiveSessionRecord>(
            "SELECT id, user_id, book_id, start_page, started_at \
             FROM active_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn start_active_session(&self, session: &ActiveSession) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // One active session per user: a new start replaces the old row.
        sqlx::query(
            "INSERT INTO active_sessions (user_id, id, book_id, start_page, started_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 id = EXCLUDED.id, book_id = EXCLUDED.book_id, \
                 start_page = EXCLUDED.start_page, started_at = EXCLUDED.started_at",
        )
        .bind(session.user_id)
        .bind(session.id)
        .bind(session.book_id)
        .bind(session.start_page)
        .bind(session.started_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("UPDATE profiles SET reading_book_id = $2 WHERE user_id = $1")
            .bind(session.user_id)
            .bind(session.book_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn clear_active_session(&self, user_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query("UPDATE profiles SET reading_book_id = NULL WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn minutes_read_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(duration_minutes), 0)::BIGINT AS minutes \
             FROM reading_sessions \
             WHERE user_id = $1 AND started_at >= $2 AND started_at < $3",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(row.get("minutes"))
    }

    async fn complete_session(&self, completion: &CompletedSession) -> PortResult<()> {
        let session = &completion.session;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The session id was minted at start time, so a retried end call
        // conflicts here and the whole completion becomes a no-op.
        let inserted = sqlx::query(
            "INSERT INTO reading_sessions \
                 (id, user_id, book_id, start_page, end_page, pages_read, \
                  duration_minutes, notes, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.book_id)
        .bind(session.start_page)
        .bind(session.end_page)
        .bind(session.pages_read)
        .bind(session.duration_minutes)
        .bind(&session.notes)
        .bind(session.started_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if inserted.rows_affected() == 0 {
            tx.commit().await.map_err(unexpected)?;
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO user_books (user_id, book_id, current_page) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, book_id) DO UPDATE SET current_page = EXCLUDED.current_page",
        )
        .bind(session.user_id)
        .bind(session.book_id)
        .bind(session.end_page)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        let patch = &completion.profile_patch;
        match &patch.streak {
            Some(fields) => {
                sqlx::query(
                    "UPDATE profiles SET \
                         total_pages_read = total_pages_read + $2, \
                         total_reading_time = total_reading_time + $3, \
                         reading_book_id = NULL, \
                         streak_days = $4, \
                         last_reading_date = $5, \
                         last_broken_streak = $6, \
                         consecutive_recoveries = $7 \
                     WHERE user_id = $1",
                )
                .bind(session.user_id)
                .bind(patch.pages_delta)
                .bind(patch.minutes_delta)
                .bind(fields.streak_days)
                .bind(fields.last_reading_date)
                .bind(fields.last_broken_streak)
                .bind(fields.consecutive_recoveries)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            }
            None => {
                sqlx::query(
                    "UPDATE profiles SET \
                         total_pages_read = total_pages_read + $2, \
                         total_reading_time = total_reading_time + $3, \
                         reading_book_id = NULL \
                     WHERE user_id = $1",
                )
                .bind(session.user_id)
                .bind(patch.pages_delta)
                .bind(patch.minutes_delta)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            }
        }

        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1")
            .bind(session.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO posts (id, user_id, book_id, session_id, kind, content) \
             VALUES ($1, $2, $3, $4, 'session_update', $5)",
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(session.book_id)
        .bind(session.id)
        .bind(&completion.post_content)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> PortResult<Vec<ReadingSession>> {
        let records = sqlx::query_as::<_, ReadingSessionRecord>(
            "SELECT id, user_id, book_id, start_page, end_page, pages_read, \
             duration_minutes, notes, started_at \
             FROM reading_sessions WHERE user_id = $1 ORDER BY started_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn apply_recovery(&self, user_id: Uuid, fields: &StreakFields) -> PortResult<()> {
        sqlx::query(
            "UPDATE profiles SET \
                 streak_days = $2, \
                 last_reading_date = $3, \
                 last_broken_streak = $4, \
                 consecutive_recoveries = $5 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(fields.streak_days)
        .bind(fields.last_reading_date)
        .bind(fields.last_broken_streak)
        .bind(fields.consecutive_recoveries)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn find_badge(&self, name: &str) -> PortResult<Option<Badge>> {
        let record = sqlx::query_as::<_, BadgeRecord>(
            "SELECT id, name, description FROM badges WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(|r| r.to_domain()))
    }

    async fn award_badge(&self, user_id: Uuid, badge_id: Uuid) -> PortResult<Option<UserBadge>> {
        // The UNIQUE (user_id, badge_id) constraint makes "already
        // awarded" a quiet non-insert rather than a race.
        let row = sqlx::query(
            "INSERT INTO user_badges (user_id, badge_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, badge_id) DO NOTHING \
             RETURNING user_id, badge_id, awarded_at",
        )
        .bind(user_id)
        .bind(badge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(row.map(|r| UserBadge {
            user_id: r.get("user_id"),
            badge_id: r.get("badge_id"),
            awarded_at: r.get("awarded_at"),
        }))
    }

    async fn badges_for_user(&self, user_id: Uuid) -> PortResult<Vec<Badge>> {
        let records = sqlx::query_as::<_, BadgeRecord>(
            "SELECT b.id, b.name, b.description \
             FROM user_badges ub JOIN badges b ON b.id = ub.badge_id \
             WHERE ub.user_id = $1 ORDER BY ub.awarded_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_book(&self, user_id: Uuid, book: &NewBook) -> PortResult<Book> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, BookRecord>(
            "INSERT INTO books (id, title, author, page_count) VALUES ($1, $2, $3, $4) \
             RETURNING id, title, author, page_count",
        )
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.page_count)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO user_books (user_id, book_id, current_page) VALUES ($1, $2, 0)",
        )
        .bind(user_id)
        .bind(record.id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn books_for_user(&self, user_id: Uuid) -> PortResult<Vec<UserBook>> {
        let rows = sqlx::query(
            "SELECT b.id, b.title, b.author, b.page_count, ub.current_page \
             FROM user_books ub JOIN books b ON b.id = ub.book_id \
             WHERE ub.user_id = $1 ORDER BY ub.added_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(rows
            .into_iter()
            .map(|r| UserBook {
                book: Book {
                    id: r.get("id"),
                    title: r.get("title"),
                    author: r.get("author"),
                    page_count: r.get("page_count"),
                },
                current_page: r.get("current_page"),
            })
            .collect())
    }

    async fn posts_for_user(&self, user_id: Uuid) -> PortResult<Vec<Post>> {
        let records = sqlx::query_as::<_, PostRecord>(
            "SELECT id, user_id, book_id, session_id, kind, content, created_at \
             FROM posts WHERE user_id = $1 ORDER BY created_at DESC LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
