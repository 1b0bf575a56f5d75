/// Registered LLM models
///
/// A model is identified externally by `(provider, provider_model_id)`,
/// which is unique. At most one model is the default; the partial unique
/// index `models_single_default` rejects a second one, and every write that
/// sets `is_default` clears the previous default in the same transaction
/// under an advisory lock.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE models (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     provider VARCHAR(64) NOT NULL,
///     provider_model_id VARCHAR(255) NOT NULL,
///     description TEXT,
///     context_length INTEGER NOT NULL CHECK (context_length > 0),
///     capabilities TEXT[] NOT NULL DEFAULT '{}',
///     parameters JSONB,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     is_default BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (provider, provider_model_id)
/// );
/// CREATE UNIQUE INDEX models_single_default ON models (is_default) WHERE is_default;
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Advisory lock key serialising default-model changes
const DEFAULT_MODEL_LOCK: i64 = 0x4d47_0002;

pub const PROVIDER_MODEL_CONSTRAINT: &str = "models_provider_model_key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Model {
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Backend that serves the model, e.g. "ollama"
    pub provider: String,

    /// The provider's own identifier, e.g. "llama3:8b"
    pub provider_model_id: String,

    pub description: Option<String>,

    /// Maximum context window in tokens
    pub context_length: i32,

    /// Capability tags such as "chat" or "code_completion"
    pub capabilities: Vec<String>,

    /// Default generation parameters passed to the provider
    pub parameters: Option<Value>,

    pub is_active: bool,

    pub is_default: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateModel {
    pub name: String,
    pub provider: String,
    pub provider_model_id: String,
    pub description: Option<String>,
    pub context_length: i32,
    pub capabilities: Vec<String>,
    pub parameters: Option<Value>,
    pub is_active: bool,
    pub is_default: bool,
}

/// Partial update of a model; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPatch {
    pub name: Option<String>,

    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,

    pub context_length: Option<i32>,

    pub capabilities: Option<Vec<String>>,

    /// `Some(None)` clears the parameters
    pub parameters: Option<Option<Value>>,

    pub is_active: Option<bool>,

    pub is_default: Option<bool>,
}

impl ModelPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, model: &mut Model) {
        if let Some(name) = self.name {
            model.name = name;
        }
        if let Some(description) = self.description {
            model.description = description;
        }
        if let Some(context_length) = self.context_length {
            model.context_length = context_length;
        }
        if let Some(capabilities) = self.capabilities {
            model.capabilities = capabilities;
        }
        if let Some(parameters) = self.parameters {
            model.parameters = parameters;
        }
        if let Some(is_active) = self.is_active {
            model.is_active = is_active;
        }
        if let Some(is_default) = self.is_default {
            model.is_default = is_default;
        }
    }
}

/// Takes the default-model lock and clears the current default, except `keep`.
async fn clear_default(conn: &mut PgConnection, keep: Option<Uuid>) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(DEFAULT_MODEL_LOCK)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        UPDATE models
        SET is_default = FALSE, updated_at = NOW()
        WHERE is_default AND ($1::uuid IS NULL OR id <> $1)
        "#,
    )
    .bind(keep)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

impl Model {
    /// Inserts a model. If it is flagged default, the previous default is
    /// cleared in the same transaction.
    pub async fn create(pool: &PgPool, data: CreateModel) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if data.is_default {
            clear_default(&mut *tx, None).await?;
        }

        let model = sqlx::query_as::<_, Model>(
            r#"
            INSERT INTO models (name, provider, provider_model_id, description, context_length,
                                capabilities, parameters, is_active, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, name, provider, provider_model_id, description, context_length,
                      capabilities, parameters, is_active, is_default, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.provider)
        .bind(&data.provider_model_id)
        .bind(&data.description)
        .bind(data.context_length)
        .bind(&data.capabilities)
        .bind(&data.parameters)
        .bind(data.is_active)
        .bind(data.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(model)
    }

    /// Inserts unless `(provider, provider_model_id)` is already registered.
    ///
    /// Returns `None` when the model already existed. Never sets a default.
    pub async fn insert_if_absent(pool: &PgPool, data: CreateModel) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            INSERT INTO models (name, provider, provider_model_id, description, context_length,
                                capabilities, parameters, is_active, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            ON CONFLICT (provider, provider_model_id) DO NOTHING
            RETURNING id, name, provider, provider_model_id, description, context_length,
                      capabilities, parameters, is_active, is_default, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.provider)
        .bind(&data.provider_model_id)
        .bind(&data.description)
        .bind(data.context_length)
        .bind(&data.capabilities)
        .bind(&data.parameters)
        .bind(data.is_active)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All models in creation order.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_provider(pool: &PgPool, provider: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            WHERE provider = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(provider)
        .fetch_all(pool)
        .await
    }

    /// The active model flagged default, if any.
    pub async fn find_default(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            WHERE is_default AND is_active
            "#,
        )
        .fetch_optional(pool)
        .await
    }

    /// The oldest active model, ties broken by id.
    pub async fn first_active(pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            WHERE is_active
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await
    }

    /// Applies `patch` to the row under `SELECT ... FOR UPDATE`.
    ///
    /// Setting `is_default = true` clears the previous default first, in the
    /// same transaction. Returns `None` if the model does not exist.
    pub async fn update(pool: &PgPool, id: Uuid, patch: ModelPatch) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if patch.is_default == Some(true) {
            clear_default(&mut *tx, Some(id)).await?;
        }

        let current = sqlx::query_as::<_, Model>(
            r#"
            SELECT id, name, provider, provider_model_id, description, context_length,
                   capabilities, parameters, is_active, is_default, created_at, updated_at
            FROM models
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut model) = current else {
            // Dropping the transaction rolls back the cleared default
            return Ok(None);
        };

        if patch.is_empty() {
            return Ok(Some(model));
        }
        patch.apply(&mut model);

        let updated = sqlx::query_as::<_, Model>(
            r#"
            UPDATE models
            SET name = $2,
                description = $3,
                context_length = $4,
                capabilities = $5,
                parameters = $6,
                is_active = $7,
                is_default = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, provider, provider_model_id, description, context_length,
                      capabilities, parameters, is_active, is_default, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&model.name)
        .bind(&model.description)
        .bind(model.context_length)
        .bind(&model.capabilities)
        .bind(&model.parameters)
        .bind(model.is_active)
        .bind(model.is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Returns `true` if a row was deleted. Access rules and usage logs go with it.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_defaults(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM models WHERE is_default")
            .fetch_one(pool)
            .await
    }
}
