/// Usage ledger entries
///
/// One row per model call, appended and never modified. `total_tokens` is
/// always computed from the prompt and completion counts; a CHECK
/// constraint rejects anything else.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE model_usage_logs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     model_id UUID NOT NULL REFERENCES models(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL,
///     request_type VARCHAR(64) NOT NULL,
///     prompt_tokens BIGINT NOT NULL,
///     completion_tokens BIGINT NOT NULL,
///     total_tokens BIGINT NOT NULL,
///     latency_ms DOUBLE PRECISION NOT NULL,
///     logged_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

pub const MODEL_FK_CONSTRAINT: &str = "model_usage_logs_model_id_fkey";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageLog {
    pub id: Uuid,

    pub model_id: Uuid,

    pub user_id: Uuid,

    /// Kind of call, e.g. "chat" or "completion"
    pub request_type: String,

    pub prompt_tokens: i64,

    pub completion_tokens: i64,

    pub total_tokens: i64,

    pub latency_ms: f64,

    #[serde(rename = "timestamp")]
    pub logged_at: DateTime<Utc>,
}

/// A call to be recorded; the total is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUsage {
    pub model_id: Uuid,
    pub user_id: Uuid,
    pub request_type: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub latency_ms: f64,
}

impl NewUsage {
    pub fn total_tokens(&self) -> i64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Aggregate usage of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModelUsageStats {
    pub model_id: Uuid,

    pub model_name: String,

    pub total_requests: i64,

    pub total_tokens: i64,

    /// Zero when the model has no entries
    pub avg_latency_ms: f64,
}

/// Midnight UTC of the day containing `now`; quota periods start here.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

impl UsageLog {
    pub async fn record(pool: &PgPool, entry: &NewUsage) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, UsageLog>(
            r#"
            INSERT INTO model_usage_logs (model_id, user_id, request_type, prompt_tokens,
                                          completion_tokens, total_tokens, latency_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, model_id, user_id, request_type, prompt_tokens, completion_tokens,
                      total_tokens, latency_ms, logged_at
            "#,
        )
        .bind(entry.model_id)
        .bind(entry.user_id)
        .bind(&entry.request_type)
        .bind(entry.prompt_tokens)
        .bind(entry.completion_tokens)
        .bind(entry.total_tokens())
        .bind(entry.latency_ms)
        .fetch_one(pool)
        .await
    }

    /// Sum of `total_tokens` for the pair since `since` (inclusive),
    /// saturating at `i64::MAX`.
    pub async fn tokens_used_since(
        pool: &PgPool,
        user_id: Uuid,
        model_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT LEAST(COALESCE(SUM(total_tokens), 0), 9223372036854775807)::BIGINT
            FROM model_usage_logs
            WHERE user_id = $1 AND model_id = $2 AND logged_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(model_id)
        .bind(since)
        .fetch_one(pool)
        .await
    }

    /// Most recent entries of a user, newest first.
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, UsageLog>(
            r#"
            SELECT id, model_id, user_id, request_type, prompt_tokens, completion_tokens,
                   total_tokens, latency_ms, logged_at
            FROM model_usage_logs
            WHERE user_id = $1
            ORDER BY logged_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Per-model aggregates over all entries, including models never used.
    pub async fn stats_by_model(pool: &PgPool) -> Result<Vec<ModelUsageStats>, sqlx::Error> {
        sqlx::query_as::<_, ModelUsageStats>(
            r#"
            SELECT m.id AS model_id,
                   m.name AS model_name,
                   COUNT(u.id) AS total_requests,
                   LEAST(COALESCE(SUM(u.total_tokens), 0), 9223372036854775807)::BIGINT AS total_tokens,
                   COALESCE(AVG(u.latency_ms), 0)::DOUBLE PRECISION AS avg_latency_ms
            FROM models m
            LEFT JOIN model_usage_logs u ON u.model_id = m.id
            GROUP BY m.id, m.name
            ORDER BY m.created_at, m.id
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
