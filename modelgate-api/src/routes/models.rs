/// Model registry endpoints
///
/// Reads are open to any authenticated caller; writes need an admin.
///
/// - `GET /v1/models` - List models
/// - `GET /v1/models/default` - The model used when none is named
/// - `GET /v1/models/:id` - One model
/// - `POST /v1/models` - Register a model
/// - `PUT /v1/models/:id` - Partial update; `is_default: true` moves the default
/// - `DELETE /v1/models/:id` - Delete with its access rules and usage
/// - `POST /v1/models/sync` - Register every model the provider serves

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use modelgate_shared::{
    auth::middleware::AuthContext,
    models::model::{CreateModel, Model, ModelPatch},
    registry::SyncReport,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{validate_request, ApiResult},
    routes::double_option,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateModelRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 64, message = "Provider must be 1-64 characters"))]
    pub provider: String,

    /// The provider's identifier for the model
    #[serde(alias = "model_id")]
    #[validate(length(min = 1, max = 255, message = "Provider model id must be 1-255 characters"))]
    pub provider_model_id: String,

    pub description: Option<String>,

    #[validate(range(min = 1, message = "Context length must be positive"))]
    pub context_length: i32,

    #[serde(default)]
    pub capabilities: Vec<String>,

    pub parameters: Option<Value>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateModelRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    #[validate(range(min = 1, message = "Context length must be positive"))]
    pub context_length: Option<i32>,

    pub capabilities: Option<Vec<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub parameters: Option<Option<Value>>,

    pub is_active: Option<bool>,

    pub is_default: Option<bool>,
}

impl From<UpdateModelRequest> for ModelPatch {
    fn from(req: UpdateModelRequest) -> Self {
        ModelPatch {
            name: req.name,
            description: req.description,
            context_length: req.context_length,
            capabilities: req.capabilities,
            parameters: req.parameters,
            is_active: req.is_active,
            is_default: req.is_default,
        }
    }
}

pub async fn list_models(State(state): State<AppState>) -> ApiResult<Json<Vec<Model>>> {
    Ok(Json(state.registry.list().await?))
}

pub async fn default_model(State(state): State<AppState>) -> ApiResult<Json<Model>> {
    Ok(Json(state.registry.get_default().await?))
}

pub async fn get_model(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Model>> {
    Ok(Json(state.registry.get(id).await?))
}

pub async fn create_model(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateModelRequest>,
) -> ApiResult<Json<Model>> {
    validate_request(&req)?;

    let data = CreateModel {
        name: req.name,
        provider: req.provider,
        provider_model_id: req.provider_model_id,
        description: req.description,
        context_length: req.context_length,
        capabilities: req.capabilities,
        parameters: req.parameters,
        is_active: req.is_active,
        is_default: req.is_default,
    };

    Ok(Json(state.registry.create(&auth, data).await?))
}

pub async fn update_model(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateModelRequest>,
) -> ApiResult<Json<Model>> {
    validate_request(&req)?;
    Ok(Json(state.registry.update(&auth, id, req.into()).await?))
}

pub async fn delete_model(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.registry.delete(&auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_models(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<SyncReport>> {
    Ok(Json(state.registry.sync(&auth, state.provider.as_ref()).await?))
}
