/// Per-user model access rules
///
/// At most one rule exists per `(model_id, user_id)`; the unique constraint
/// `model_access_controls_model_user_key` guarantees it even when two admins
/// create the same rule at once. Rules are deleted with their model or user.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE model_access_controls (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     model_id UUID NOT NULL REFERENCES models(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role_id VARCHAR(64),
///     can_use BOOLEAN NOT NULL DEFAULT TRUE,
///     token_limit BIGINT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (model_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

pub const MODEL_USER_CONSTRAINT: &str = "model_access_controls_model_user_key";
pub const MODEL_FK_CONSTRAINT: &str = "model_access_controls_model_id_fkey";
pub const USER_FK_CONSTRAINT: &str = "model_access_controls_user_id_fkey";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessControl {
    pub id: Uuid,

    pub model_id: Uuid,

    pub user_id: Uuid,

    /// Free-form role label, informational only
    pub role_id: Option<String>,

    /// `false` revokes access outright
    pub can_use: bool,

    /// Daily token ceiling; `None` is unlimited
    pub token_limit: Option<i64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccessControl {
    pub model_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Option<String>,
    pub can_use: bool,
    pub token_limit: Option<i64>,
}

/// Partial update of a rule; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlPatch {
    pub can_use: Option<bool>,

    /// `Some(None)` removes the limit
    pub token_limit: Option<Option<i64>>,
}

impl AccessControlPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, rule: &mut AccessControl) {
        if let Some(can_use) = self.can_use {
            rule.can_use = can_use;
        }
        if let Some(token_limit) = self.token_limit {
            rule.token_limit = token_limit;
        }
    }
}

impl AccessControl {
    /// Inserts a rule.
    ///
    /// # Errors
    ///
    /// A unique violation on [`MODEL_USER_CONSTRAINT`] if a rule already
    /// exists for the pair; a foreign key violation if the model or user is
    /// missing.
    pub async fn create(pool: &PgPool, data: CreateAccessControl) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AccessControl>(
            r#"
            INSERT INTO model_access_controls (model_id, user_id, role_id, can_use, token_limit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            "#,
        )
        .bind(data.model_id)
        .bind(data.user_id)
        .bind(&data.role_id)
        .bind(data.can_use)
        .bind(data.token_limit)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccessControl>(
            r#"
            SELECT id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            FROM model_access_controls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// The rule governing `user_id` on `model_id`, if one exists.
    pub async fn find_for(pool: &PgPool, user_id: Uuid, model_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccessControl>(
            r#"
            SELECT id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            FROM model_access_controls
            WHERE user_id = $1 AND model_id = $2
            "#,
        )
        .bind(user_id)
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccessControl>(
            r#"
            SELECT id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            FROM model_access_controls
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Returns `None` if the rule does not exist.
    pub async fn update(pool: &PgPool, id: Uuid, patch: AccessControlPatch) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let current = sqlx::query_as::<_, AccessControl>(
            r#"
            SELECT id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            FROM model_access_controls
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut rule) = current else {
            return Ok(None);
        };

        if patch.is_empty() {
            return Ok(Some(rule));
        }
        patch.apply(&mut rule);

        let updated = sqlx::query_as::<_, AccessControl>(
            r#"
            UPDATE model_access_controls
            SET can_use = $2, token_limit = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, model_id, user_id, role_id, can_use, token_limit, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(rule.can_use)
        .bind(rule.token_limit)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM model_access_controls WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
