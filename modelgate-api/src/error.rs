/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every [`AuthorityError`] converts into an
/// [`ApiError`] with the matching HTTP status. Bodies look like:
///
/// ```json
/// {
///   "error": "not_found",
///   "message": "Model not found",
///   "request_id": "0b6f5c1e-..."
/// }
/// ```
///
/// Internal errors are logged with the request ID and returned with an
/// opaque message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use modelgate_shared::auth::authorization::AuthzError;
use modelgate_shared::error::AuthorityError;
use modelgate_shared::models::usage::start_of_day;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::request_id::current_request_id;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Seconds a client should wait before retrying after a store outage
const STORE_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 401, with `WWW-Authenticate: Bearer`
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403 for role or ownership violations
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 403 for a policy denial; `reason` is the machine-readable code
    #[error("Access denied ({reason}): {message}")]
    AccessDenied { reason: &'static str, message: String },

    /// 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 422
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// 429; the quota resets at the next UTC midnight
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { retry_after: u64, message: String },

    /// 502
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// 500
    #[error("Internal error: {0}")]
    InternalError(String),

    /// 503
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { retry_after: u64, message: String },
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "quota_exceeded")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::AccessDenied { reason, .. } => *reason,
            ApiError::NotFound(_) => "not_found",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::QuotaExceeded { .. } => "quota_exceeded",
            ApiError::BadGateway(_) => "bad_gateway",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.code().to_string();
        let request_id = current_request_id();

        let retry_after = match &self {
            ApiError::QuotaExceeded { retry_after, .. }
            | ApiError::ServiceUnavailable { retry_after, .. } => Some(*retry_after),
            _ => None,
        };
        let www_authenticate = matches!(self, ApiError::Unauthorized(_));

        let (message, details) = match self {
            ApiError::ValidationError(errors) => ("Request validation failed".to_string(), Some(errors)),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(request_id = request_id.as_deref().unwrap_or("-"), "Internal error: {}", msg);
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadGateway(msg)
            | ApiError::AccessDenied { message: msg, .. }
            | ApiError::QuotaExceeded { message: msg, .. }
            | ApiError::ServiceUnavailable { message: msg, .. } => (msg, None),
        };

        let body = Json(ErrorResponse {
            error,
            message,
            details,
            request_id,
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();

        if www_authenticate {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(seconds) = retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

/// Seconds from `now` until the quota period ends.
pub fn seconds_until_quota_reset(now: DateTime<Utc>) -> u64 {
    let next = start_of_day(now) + chrono::Duration::days(1);
    (next - now).num_seconds().max(1) as u64
}

impl From<AuthorityError> for ApiError {
    fn from(err: AuthorityError) -> Self {
        let message = err.to_string();

        match err {
            AuthorityError::InvalidCredentials
            | AuthorityError::InvalidToken
            | AuthorityError::ExpiredToken => ApiError::Unauthorized(message),

            AuthorityError::Forbidden(_) => ApiError::Forbidden(message),

            AuthorityError::InactiveUser
            | AuthorityError::DuplicateUsername
            | AuthorityError::DuplicateEmail
            | AuthorityError::DuplicateModel
            | AuthorityError::AccessControlAlreadyExists
            | AuthorityError::SelfDeletion
            | AuthorityError::InvalidUsage(_) => ApiError::BadRequest(message),

            AuthorityError::NotFound(_) | AuthorityError::NoActiveModel => ApiError::NotFound(message),

            AuthorityError::ModelUnavailable => ApiError::AccessDenied {
                reason: "model_unavailable",
                message,
            },
            AuthorityError::AccessRevoked => ApiError::AccessDenied {
                reason: "access_revoked",
                message,
            },
            AuthorityError::NoAccessRule => ApiError::AccessDenied {
                reason: "no_access_rule",
                message,
            },
            AuthorityError::QuotaExceeded { .. } => ApiError::QuotaExceeded {
                retry_after: seconds_until_quota_reset(Utc::now()),
                message,
            },

            AuthorityError::Provider(_) => ApiError::BadGateway(message),

            AuthorityError::StoreUnavailable(reason) => {
                tracing::warn!(%reason, "Store unavailable");
                ApiError::ServiceUnavailable {
                    retry_after: STORE_RETRY_AFTER_SECS,
                    message: "Service temporarily unavailable, retry later".to_string(),
                }
            }

            AuthorityError::Store(_) | AuthorityError::Password(_) | AuthorityError::TokenSigning(_) => {
                ApiError::InternalError(message)
            }
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        AuthorityError::from(err).into()
    }
}

/// Runs `validator` rules on a request body.
pub fn validate_request<T: Validate>(req: &T) -> ApiResult<()> {
    req.validate().map_err(|e| {
        let errors: Vec<ValidationErrorDetail> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use modelgate_shared::db::StoreError;
    use modelgate_shared::error::Resource;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::ValidationError(vec![
            ValidationErrorDetail {
                field: "email".to_string(),
                message: "Invalid email format".to_string(),
            },
            ValidationErrorDetail {
                field: "password".to_string(),
                message: "Password too short".to_string(),
            },
        ]);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthorityError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthorityError::ExpiredToken, StatusCode::UNAUTHORIZED),
            (AuthorityError::Forbidden("Admin required".to_string()), StatusCode::FORBIDDEN),
            (AuthorityError::NotFound(Resource::Model), StatusCode::NOT_FOUND),
            (AuthorityError::NoActiveModel, StatusCode::NOT_FOUND),
            (AuthorityError::DuplicateEmail, StatusCode::BAD_REQUEST),
            (AuthorityError::AccessControlAlreadyExists, StatusCode::BAD_REQUEST),
            (AuthorityError::SelfDeletion, StatusCode::BAD_REQUEST),
            (AuthorityError::InactiveUser, StatusCode::BAD_REQUEST),
            (AuthorityError::AccessRevoked, StatusCode::FORBIDDEN),
            (
                AuthorityError::QuotaExceeded {
                    limit: 100,
                    used: 90,
                    requested: 20,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AuthorityError::StoreUnavailable("pool timed out".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AuthorityError::Store(StoreError::CheckViolation {
                    constraint: "models_context_length_check".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_unauthorized_carries_challenge() {
        let response = ApiError::from(AuthorityError::InvalidToken).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
        assert_eq!(body_json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_denial_uses_reason_code() {
        let response = ApiError::from(AuthorityError::ModelUnavailable).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "model_unavailable");
    }

    #[tokio::test]
    async fn test_store_outage_sets_retry_after() {
        let response =
            ApiError::from(AuthorityError::StoreUnavailable("deadline".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[tokio::test]
    async fn test_internal_error_is_opaque() {
        let response = ApiError::InternalError("connection reset by peer".to_string()).into_response();
        let body = body_json(response).await;

        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("request_id").is_none());
    }

    #[test]
    fn test_quota_reset() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 23, 59, 0).unwrap();
        assert_eq!(seconds_until_quota_reset(now), 60);

        let midnight = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(seconds_until_quota_reset(midnight), 86_400);
    }
}
