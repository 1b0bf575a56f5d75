/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use modelgate_api::{app::AppState, config::Config};
/// use modelgate_shared::db::pool::create_pool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(&config.database_config()).await?;
/// let state = AppState::new(pool, config)?;
/// let app = modelgate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use modelgate_shared::auth::credentials::Accounts;
use modelgate_shared::auth::jwt::TokenAuthority;
use modelgate_shared::auth::middleware::jwt_auth_middleware;
use modelgate_shared::db::Store;
use modelgate_shared::ledger::UsageLedger;
use modelgate_shared::policy::AccessPolicy;
use modelgate_shared::provider::ModelProvider;
use modelgate_shared::registry::ModelRegistry;
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;
use crate::middleware::request_id::{RequestId, RequestIdLayer};
use crate::ollama::OllamaProvider;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    pub tokens: Arc<TokenAuthority>,

    pub accounts: Accounts,

    pub registry: ModelRegistry,

    pub policy: AccessPolicy,

    pub ledger: UsageLedger,

    /// Backend used by `POST /v1/models/sync`
    pub provider: Arc<dyn ModelProvider>,
}

impl AppState {
    /// State with the Ollama provider from the configuration.
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let provider = OllamaProvider::new(config.ollama.api_url.clone())?;
        Ok(Self::with_provider(db, config, Arc::new(provider)))
    }

    pub fn with_provider(db: PgPool, config: Config, provider: Arc<dyn ModelProvider>) -> Self {
        let store = Store::new(db.clone(), config.retry_policy());
        let tokens = TokenAuthority::from_secret(config.jwt.secret.as_deref(), config.token_ttl());

        Self {
            accounts: Accounts::new(store.clone()),
            registry: ModelRegistry::new(store.clone()),
            policy: AccessPolicy::new(store.clone(), config.policy_config()),
            ledger: UsageLedger::new(store),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
            provider,
            db,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health                      (public)
/// └── /v1/
///     ├── POST /token                  (public)
///     ├── POST /users                  (public registration)
///     ├── /users, /users/me, /users/:id
///     ├── /models, /models/default, /models/sync, /models/:id
///     ├── /access, /access/check, /access/user/:user_id, /access/:id
///     └── /usage, /usage/stats, /usage/user/:user_id
/// ```
///
/// Everything under `/v1` except token issuance and registration requires
/// a bearer token.
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Request ID (`X-Request-ID`)
/// 2. CORS
/// 3. Compression
/// 4. Logging (tower-http TraceLayer, span carries `request_id` and `user_id`)
/// 5. Authentication (protected routes only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_routes = Router::new()
        .route("/token", post(routes::auth::issue_token))
        .route("/users", post(routes::users::register));

    let protected_routes = Router::new()
        .route("/users", get(routes::users::list_users))
        .route("/users/me", get(routes::users::me))
        .route(
            "/users/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route(
            "/models",
            get(routes::models::list_models).post(routes::models::create_model),
        )
        .route("/models/default", get(routes::models::default_model))
        .route("/models/sync", post(routes::models::sync_models))
        .route(
            "/models/:id",
            get(routes::models::get_model)
                .put(routes::models::update_model)
                .delete(routes::models::delete_model),
        )
        .route("/access", post(routes::access::grant_access))
        .route("/access/check", post(routes::access::check_access))
        .route("/access/user/:user_id", get(routes::access::list_user_access))
        .route(
            "/access/:id",
            get(routes::access::get_access)
                .put(routes::access::update_access)
                .delete(routes::access::delete_access),
        )
        .route("/usage", post(routes::usage::record_usage))
        .route("/usage/stats", get(routes::usage::usage_stats))
        .route("/usage/user/:user_id", get(routes::usage::user_history))
        .route_layer(from_fn_with_state(state.tokens.clone(), jwt_auth_middleware));

    let v1_routes = Router::new().merge(public_routes).merge(protected_routes);

    let cors = if state.config.allows_any_origin() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .map(|id| id.as_str())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                        user_id = tracing::field::Empty,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(RequestIdLayer::new())
        .with_state(state)
}
