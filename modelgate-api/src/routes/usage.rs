/// Usage ledger endpoints
///
/// - `POST /v1/usage` - Record one model call for the caller
/// - `GET /v1/usage/stats` - Per-model totals (admin)
/// - `GET /v1/usage/user/:user_id?limit` - Latest entries of a user (self or admin)
///
/// `total_tokens` is always computed from the prompt and completion counts;
/// a client-supplied total is ignored.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use modelgate_shared::{
    auth::{authorization::require_self_or_admin, credentials::DEFAULT_PAGE_SIZE, middleware::AuthContext},
    models::usage::{ModelUsageStats, NewUsage, UsageLog},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RecordUsageRequest {
    pub model_id: Uuid,

    /// Only an admin may record usage on behalf of another user
    pub user_id: Option<Uuid>,

    #[validate(length(min = 1, max = 64, message = "Request type must be 1-64 characters"))]
    pub request_type: String,

    #[validate(range(min = 0, max = 2147483647, message = "Token counts must be between 0 and 2147483647"))]
    pub prompt_tokens: i64,

    #[validate(range(min = 0, max = 2147483647, message = "Token counts must be between 0 and 2147483647"))]
    pub completion_tokens: i64,

    #[validate(range(min = 0.0, message = "Latency must not be negative"))]
    pub latency_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn record_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RecordUsageRequest>,
) -> ApiResult<Json<UsageLog>> {
    validate_request(&req)?;

    let user_id = req.user_id.unwrap_or(auth.user_id);
    require_self_or_admin(&auth, user_id)?;

    let entry = NewUsage {
        model_id: req.model_id,
        user_id,
        request_type: req.request_type,
        prompt_tokens: req.prompt_tokens,
        completion_tokens: req.completion_tokens,
        latency_ms: req.latency_ms,
    };

    Ok(Json(state.ledger.record(entry).await?))
}

pub async fn usage_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ModelUsageStats>>> {
    Ok(Json(state.ledger.stats_by_model(&auth).await?))
}

pub async fn user_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<UsageLog>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(Json(state.ledger.history(&auth, user_id, limit).await?))
}
