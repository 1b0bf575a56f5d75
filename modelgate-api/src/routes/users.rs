/// User account endpoints
///
/// - `POST /v1/users` - Register (public; the first account becomes admin)
/// - `GET /v1/users/me` - Current user
/// - `GET /v1/users?skip&limit` - List users (admin)
/// - `GET /v1/users/:id` - One user (self or admin)
/// - `PUT /v1/users/:id` - Update (self or admin; `is_admin` needs admin)
/// - `DELETE /v1/users/:id` - Delete (admin, never self)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use modelgate_shared::{
    auth::{
        authorization::require_self_or_admin,
        credentials::{AccountUpdate, NewAccount, DEFAULT_PAGE_SIZE},
        middleware::AuthContext,
    },
    models::user::User,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
    routes::double_option,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    /// `null` clears the name
    #[serde(default, deserialize_with = "double_option")]
    pub full_name: Option<Option<String>>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,

    pub is_active: Option<bool>,

    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub skip: i64,

    pub limit: Option<i64>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<User>> {
    validate_request(&req)?;

    let user = state
        .accounts
        .register(NewAccount {
            username: req.username,
            email: req.email,
            password: req.password,
            full_name: req.full_name,
        })
        .await?;

    Ok(Json(user))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.accounts.get(auth.user_id).await?))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(Json(state.accounts.list(&auth, query.skip, limit).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    require_self_or_admin(&auth, id)?;
    Ok(Json(state.accounts.get(id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    validate_request(&req)?;

    let update = AccountUpdate {
        email: req.email,
        full_name: req.full_name,
        password: req.password,
        is_active: req.is_active,
        is_admin: req.is_admin,
    };

    Ok(Json(state.accounts.update(&auth, id, update).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.accounts.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
