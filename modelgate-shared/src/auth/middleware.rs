/// Bearer authentication middleware for Axum
///
/// Reads `Authorization: Bearer <token>`, verifies it with the
/// [`TokenAuthority`], and inserts an [`AuthContext`] into the request
/// extensions. Verification is pure computation; the store is never
/// consulted, so a token stays usable until it expires.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{middleware, routing::get, Extension, Router};
/// use chrono::Duration;
/// use modelgate_shared::auth::jwt::TokenAuthority;
/// use modelgate_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     auth.username
/// }
///
/// let authority = Arc::new(TokenAuthority::from_secret(None, Duration::minutes(30)));
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn_with_state(authority, jwt_auth_middleware));
/// ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::jwt::{Claims, TokenAuthority, TokenError};

/// Identity of the caller, available to handlers via `Extension<AuthContext>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    pub username: String,

    pub is_admin: bool,
}

impl AuthContext {
    pub fn new(user_id: Uuid, username: impl Into<String>, is_admin: bool) -> Self {
        Self {
            user_id,
            username: username.into(),
            is_admin,
        }
    }

    /// True when the caller is `user_id` or an administrator
    pub fn is_self_or_admin(&self, user_id: Uuid) -> bool {
        self.is_admin || self.user_id == user_id
    }
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.sub,
            is_admin: claims.is_admin,
        }
    }
}

/// Error type for authentication middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No Authorization header
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    InvalidFormat,

    InvalidToken,

    ExpiredToken,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "Not authenticated",
            AuthError::InvalidFormat => "Expected a Bearer token",
            AuthError::InvalidToken => "Could not validate credentials",
            AuthError::ExpiredToken => "Token has expired",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid(_) | TokenError::Signing(_) => AuthError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "unauthorized",
            "message": self.message(),
        });

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
            Json(body),
        )
            .into_response()
    }
}

/// Extracts the raw token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::InvalidFormat);
    }

    Ok(token.trim())
}

/// Verifies the request's bearer token and returns the caller identity.
pub fn authenticate(authority: &TokenAuthority, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;
    let claims = authority.verify(token)?;
    Ok(AuthContext::from(claims))
}

/// Rejects the request with 401 unless it carries a valid bearer token.
pub async fn jwt_auth_middleware(
    State(authority): State<Arc<TokenAuthority>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = authenticate(&authority, req.headers())?;

    tracing::Span::current().record("user_id", tracing::field::display(auth.user_id));
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
