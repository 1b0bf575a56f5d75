//! Shared infrastructure for the HTTP tests.
//!
//! Each test gets a fresh database from `#[sqlx::test]`; the router is driven
//! in-process through `tower::Service::call`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use modelgate_api::app::{build_router, AppState};
use modelgate_api::config::Config;
use modelgate_shared::auth::credentials::NewAccount;
use modelgate_shared::models::user::User;
use modelgate_shared::provider::{ModelProvider, ProviderError, ProviderModel};
use serde_json::Value;
use sqlx::PgPool;
use tower::Service as _;

pub const TEST_JWT_SECRET: &str = "modelgate-test-secret-at-least-32-bytes";

/// Provider serving a fixed list of models
pub struct StaticProvider(pub Vec<&'static str>);

#[async_trait]
impl ModelProvider for StaticProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ProviderError> {
        Ok(self.0.iter().map(|id| ProviderModel::new(*id)).collect())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestContext {
    pub db: PgPool,
    pub state: AppState,
    pub app: Router,
    pub admin: User,
    pub admin_token: String,
    pub user: User,
    pub user_token: String,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::from([
        ("DATABASE_URL".to_string(), "postgresql://localhost/unused".to_string()),
        ("JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
        ("STORE_TIMEOUT_MS".to_string(), "10000".to_string()),
    ]);
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }

    Config::from_lookup(|key| env.get(key).cloned()).expect("Invalid test configuration")
}

impl TestContext {
    /// Router over `db` with an admin (registered first) and a regular user.
    pub async fn new(db: PgPool) -> Self {
        Self::with_config(db, test_config(&[])).await
    }

    pub async fn with_config(db: PgPool, config: Config) -> Self {
        let provider = Arc::new(StaticProvider(vec!["llama3:8b", "mistral:7b"]));
        let state = AppState::with_provider(db.clone(), config, provider);
        let app = build_router(state.clone());

        let admin = state
            .accounts
            .register(account("admin"))
            .await
            .expect("Failed to register admin");
        let user = state
            .accounts
            .register(account("alice"))
            .await
            .expect("Failed to register user");

        let admin_token = state
            .tokens
            .issue(admin.id, &admin.username, admin.is_admin, None)
            .expect("Failed to issue admin token");
        let user_token = state
            .tokens
            .issue(user.id, &user.username, user.is_admin, None)
            .expect("Failed to issue user token");

        Self {
            db,
            state,
            app,
            admin,
            admin_token,
            user,
            user_token,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().call(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers a model through the API as admin and returns its id.
    pub async fn create_model(&self, provider_model_id: &str) -> String {
        let response = self
            .post(
                "/v1/models",
                &self.admin_token,
                serde_json::json!({
                    "name": provider_model_id.to_uppercase(),
                    "provider": "ollama",
                    "model_id": provider_model_id,
                    "context_length": 4096,
                    "capabilities": ["chat"],
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        response.body["id"].as_str().unwrap().to_string()
    }
}

pub fn account(username: &str) -> NewAccount {
    NewAccount {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: format!("{}-password", username),
        full_name: None,
    }
}
