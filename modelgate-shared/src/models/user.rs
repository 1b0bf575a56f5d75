/// User accounts
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username VARCHAR(100) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     hashed_password VARCHAR(255) NOT NULL,
///     full_name VARCHAR(255),
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use modelgate_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let user = User::create(&pool, CreateUser {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     hashed_password: "$argon2id$...".to_string(),
///     full_name: None,
/// }).await?;
///
/// // The first account ever created is the administrator
/// println!("admin: {}", user.is_admin);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Advisory lock key serialising account creation
const USER_CREATE_LOCK: i64 = 0x4d47_0001;

pub const USERNAME_CONSTRAINT: &str = "users_username_key";
pub const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Unique login name, also the token subject
    pub username: String,

    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub hashed_password: String,

    pub full_name: Option<String>,

    /// Inactive users cannot log in
    pub is_active: bool,

    pub is_admin: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
}

/// Partial update of a user row; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub email: Option<String>,

    /// `Some(None)` clears the name
    pub full_name: Option<Option<String>>,

    pub hashed_password: Option<String>,

    pub is_active: Option<bool>,

    pub is_admin: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the supplied fields into `user`.
    pub fn apply(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(hashed_password) = self.hashed_password {
            user.hashed_password = hashed_password;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(is_admin) = self.is_admin {
            user.is_admin = is_admin;
        }
    }
}

impl User {
    /// Inserts a user. Creation is serialised by an advisory lock so that
    /// exactly one account, the first, is created with `is_admin = true`.
    ///
    /// # Errors
    ///
    /// Unique violations on `users_username_key` / `users_email_key` when the
    /// name or address is taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(USER_CREATE_LOCK)
            .execute(&mut *tx)
            .await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, hashed_password, full_name, is_admin)
            SELECT $1, $2, $3, $4, NOT EXISTS (SELECT 1 FROM users)
            RETURNING id, username, email, hashed_password, full_name,
                      is_active, is_admin, created_at, updated_at
            "#,
        )
        .bind(&data.username)
        .bind(&data.email)
        .bind(&data.hashed_password)
        .bind(&data.full_name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, hashed_password, full_name,
                   is_active, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, hashed_password, full_name,
                   is_active, is_admin, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    /// Applies `patch` to the row under `SELECT ... FOR UPDATE`.
    ///
    /// Returns `None` if the user does not exist.
    pub async fn update(pool: &PgPool, id: Uuid, patch: UserPatch) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, hashed_password, full_name,
                   is_active, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut user) = current else {
            return Ok(None);
        };

        if patch.is_empty() {
            return Ok(Some(user));
        }
        patch.apply(&mut user);

        let updated = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2,
                full_name = $3,
                hashed_password = $4,
                is_active = $5,
                is_admin = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, username, email, hashed_password, full_name,
                      is_active, is_admin, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_admin)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Users in creation order.
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, hashed_password, full_name,
                   is_active, is_admin, created_at, updated_at
            FROM users
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }
}
