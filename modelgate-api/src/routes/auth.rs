/// Token issuance
///
/// # Endpoint
///
/// ```text
/// POST /v1/token
/// Content-Type: application/x-www-form-urlencoded
///
/// username=alice&password=correct+horse
/// ```
///
/// A JSON body with the same fields is accepted too.
///
/// # Response
///
/// ```json
/// {
///   "access_token": "eyJ...",
///   "token_type": "bearer",
///   "expires_in": 1800,
///   "user_id": "uuid",
///   "username": "alice",
///   "is_admin": false
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: unknown user or wrong password (same response for both)
/// - `400 Bad Request`: the account is inactive
/// - `422 Unprocessable Entity`: missing or malformed fields

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request, State},
    http::header,
    Form, Json,
};
use modelgate_shared::error::AuthorityError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult, ValidationErrorDetail},
};

#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "bearer"
    pub token_type: String,

    /// Lifetime in seconds
    pub expires_in: i64,

    pub user_id: Uuid,

    pub username: String,

    pub is_admin: bool,
}

/// Login credentials from either a form or a JSON body.
pub struct Credentials(pub TokenRequest);

fn body_error(message: String) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: "body".to_string(),
        message,
    }])
}

#[async_trait]
impl<S> FromRequest<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(body) = Json::<TokenRequest>::from_request(req, state)
                .await
                .map_err(|e| body_error(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<TokenRequest>::from_request(req, state)
                .await
                .map_err(|e| body_error(e.body_text()))?;
            Ok(Self(body))
        }
    }
}

pub async fn issue_token(
    State(state): State<AppState>,
    Credentials(req): Credentials,
) -> ApiResult<Json<TokenResponse>> {
    validate_request(&req)?;

    let user = state.accounts.authenticate(&req.username, &req.password).await?;

    let access_token = state
        .tokens
        .issue(user.id, &user.username, user.is_admin, None)
        .map_err(AuthorityError::from)?;

    tracing::info!(user_id = %user.id, "Issued access token");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.tokens.default_ttl().num_seconds(),
        user_id: user.id,
        username: user.username,
        is_admin: user.is_admin,
    }))
}
