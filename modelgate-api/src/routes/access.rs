/// Access rule and policy endpoints
///
/// - `POST /v1/access` - Create a rule (admin)
/// - `GET /v1/access/:id` - One rule (admin)
/// - `PUT /v1/access/:id` - Change `can_use` / `token_limit` (admin)
/// - `DELETE /v1/access/:id` - Delete a rule (admin)
/// - `GET /v1/access/user/:user_id` - Rules of a user (self or admin)
/// - `POST /v1/access/check` - May the caller use a model right now?
///
/// # Check
///
/// ```text
/// POST /v1/access/check
/// Authorization: Bearer eyJ...
///
/// { "model_id": "uuid", "requested_tokens": 500 }
/// ```
///
/// `model_id` may be omitted to check the default model. A denial is a
/// normal answer, not an error:
///
/// ```json
/// {
///   "allowed": false,
///   "model_id": "uuid",
///   "reason": "quota_exceeded",
///   "token_limit": 1000,
///   "remaining": null
/// }
/// ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use modelgate_shared::{
    auth::middleware::AuthContext,
    models::access_control::{AccessControl, AccessControlPatch, CreateAccessControl},
    policy::{Decision, DenyReason},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult, ValidationErrorDetail},
    routes::double_option,
};

#[derive(Debug, Deserialize, Validate)]
pub struct GrantAccessRequest {
    pub model_id: Uuid,

    pub user_id: Uuid,

    #[validate(length(max = 64, message = "Role id must be at most 64 characters"))]
    pub role_id: Option<String>,

    #[serde(default = "default_true")]
    pub can_use: bool,

    #[validate(range(min = 0, message = "Token limit must not be negative"))]
    pub token_limit: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccessRequest {
    pub can_use: Option<bool>,

    /// `null` removes the limit
    #[serde(default, deserialize_with = "double_option")]
    pub token_limit: Option<Option<i64>>,
}

impl UpdateAccessRequest {
    fn validate_limit(&self) -> ApiResult<()> {
        match self.token_limit {
            Some(Some(limit)) if limit < 0 => Err(ApiError::ValidationError(vec![ValidationErrorDetail {
                field: "token_limit".to_string(),
                message: "Token limit must not be negative".to_string(),
            }])),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckAccessRequest {
    /// Defaults to the default model
    pub model_id: Option<Uuid>,

    pub requested_tokens: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckAccessResponse {
    pub allowed: bool,

    pub model_id: Uuid,

    /// Denial reason code, e.g. "access_revoked"
    pub reason: Option<String>,

    pub token_limit: Option<i64>,

    /// Tokens left today after this request
    pub remaining: Option<i64>,
}

impl CheckAccessResponse {
    fn new(model_id: Uuid, decision: Decision) -> Self {
        match decision {
            Decision::Allow {
                token_limit,
                remaining,
            } => Self {
                allowed: true,
                model_id,
                reason: None,
                token_limit,
                remaining,
            },
            Decision::Deny(reason) => Self {
                allowed: false,
                model_id,
                reason: Some(reason.as_str().to_string()),
                token_limit: match reason {
                    DenyReason::QuotaExceeded { limit, .. } => Some(limit),
                    _ => None,
                },
                remaining: None,
            },
        }
    }
}

pub async fn grant_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<GrantAccessRequest>,
) -> ApiResult<Json<AccessControl>> {
    validate_request(&req)?;

    let data = CreateAccessControl {
        model_id: req.model_id,
        user_id: req.user_id,
        role_id: req.role_id,
        can_use: req.can_use,
        token_limit: req.token_limit,
    };

    Ok(Json(state.policy.grant(&auth, data).await?))
}

pub async fn get_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AccessControl>> {
    Ok(Json(state.policy.get(&auth, id).await?))
}

pub async fn update_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAccessRequest>,
) -> ApiResult<Json<AccessControl>> {
    req.validate_limit()?;

    let patch = AccessControlPatch {
        can_use: req.can_use,
        token_limit: req.token_limit,
    };

    Ok(Json(state.policy.update(&auth, id, patch).await?))
}

pub async fn delete_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.policy.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_user_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<AccessControl>>> {
    Ok(Json(state.policy.list_for_user(&auth, user_id).await?))
}

pub async fn check_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CheckAccessRequest>,
) -> ApiResult<Json<CheckAccessResponse>> {
    let model_id = match req.model_id {
        Some(id) => id,
        None => state.registry.get_default().await?.id,
    };

    let decision = state
        .policy
        .authorize(auth.user_id, model_id, req.requested_tokens)
        .await?;

    Ok(Json(CheckAccessResponse::new(model_id, decision)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_response_from_decisions() {
        let id = Uuid::new_v4();

        let allowed = CheckAccessResponse::new(
            id,
            Decision::Allow {
                token_limit: Some(100),
                remaining: Some(40),
            },
        );
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, Some(40));
        assert!(allowed.reason.is_none());

        let denied = CheckAccessResponse::new(
            id,
            Decision::Deny(DenyReason::QuotaExceeded {
                limit: 100,
                used: 90,
                requested: 20,
            }),
        );
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("quota_exceeded"));
        assert_eq!(denied.token_limit, Some(100));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let req = UpdateAccessRequest {
            can_use: None,
            token_limit: Some(Some(-1)),
        };
        assert!(req.validate_limit().is_err());

        let clear = UpdateAccessRequest {
            can_use: None,
            token_limit: Some(None),
        };
        assert!(clear.validate_limit().is_ok());
    }
}
