//! services/api/src/adapters/auth.rs
//!
//! Repository for the authentication shell: user accounts and cookie auth
//! sessions. Auth is deliberately kept out of the core crate; the reading
//! logic only ever sees an already-resolved `user_id`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A user account, safe to expose.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
}

/// Credentials for login verification only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

#[derive(Clone)]
pub struct AuthRepo {
    pool: PgPool,
}

impl AuthRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new account. Fails on a duplicate email.
    pub async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            user_id: row.get("user_id"),
            email: row.get("email"),
        })
    }

    pub async fn get_credentials(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserCredentials {
            user_id: r.get("user_id"),
            email: r.get("email"),
            hashed_password: r.get("hashed_password"),
        }))
    }

    pub async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolves an auth session cookie to a user id, ignoring expired rows.
    pub async fn validate_auth_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("user_id")))
    }

    pub async fn delete_auth_session(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
