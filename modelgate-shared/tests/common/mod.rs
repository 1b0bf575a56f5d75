//! Shared fixtures for the database integration tests.
//!
//! Every test gets a fresh database from `#[sqlx::test]` with the workspace
//! migrations applied, so fixtures can assume an empty store.

#![allow(dead_code)]

use async_trait::async_trait;
use modelgate_shared::auth::credentials::{Accounts, NewAccount};
use modelgate_shared::auth::middleware::AuthContext;
use modelgate_shared::db::{RetryPolicy, Store};
use modelgate_shared::ledger::UsageLedger;
use modelgate_shared::models::model::{CreateModel, Model};
use modelgate_shared::models::user::User;
use modelgate_shared::policy::{AccessPolicy, PolicyConfig};
use modelgate_shared::provider::{ModelProvider, ProviderError, ProviderModel};
use modelgate_shared::registry::ModelRegistry;
use sqlx::PgPool;

pub struct Fixture {
    pub pool: PgPool,
    pub accounts: Accounts,
    pub registry: ModelRegistry,
    pub policy: AccessPolicy,
    pub ledger: UsageLedger,
    pub admin: AuthContext,
    pub user: AuthContext,
}

impl Fixture {
    /// Services over `pool` plus an admin (registered first) and a regular user.
    pub async fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, PolicyConfig::default()).await
    }

    pub async fn with_policy(pool: PgPool, policy: PolicyConfig) -> Self {
        let store = Store::new(pool.clone(), RetryPolicy::default());
        let accounts = Accounts::new(store.clone());

        let admin = accounts
            .register(account("admin"))
            .await
            .expect("Failed to register admin");
        let user = accounts
            .register(account("user"))
            .await
            .expect("Failed to register user");

        Self {
            pool,
            accounts,
            registry: ModelRegistry::new(store.clone()),
            policy: AccessPolicy::new(store.clone(), policy),
            ledger: UsageLedger::new(store),
            admin: context(&admin),
            user: context(&user),
        }
    }

    pub async fn model(&self, provider_model_id: &str) -> Model {
        self.registry
            .create(&self.admin, create_model(provider_model_id, false))
            .await
            .expect("Failed to create model")
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

pub fn context(user: &User) -> AuthContext {
    AuthContext::new(user.id, user.username.clone(), user.is_admin)
}

pub fn create_model(provider_model_id: &str, is_default: bool) -> CreateModel {
    CreateModel {
        name: provider_model_id.to_uppercase(),
        provider: "ollama".to_string(),
        provider_model_id: provider_model_id.to_string(),
        description: None,
        context_length: 4096,
        capabilities: vec!["chat".to_string()],
        parameters: None,
        is_active: true,
        is_default,
    }
}

/// Provider serving a fixed list of models
pub struct StaticProvider {
    pub models: Vec<ProviderModel>,
}

impl StaticProvider {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            models: ids.iter().map(|id| ProviderModel::new(*id)).collect(),
        }
    }
}

#[async_trait]
impl ModelProvider for StaticProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ProviderError> {
        Ok(self.models.clone())
    }
}

/// Provider whose backend is down
pub struct UnreachableProvider;

#[async_trait]
impl ModelProvider for UnreachableProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ProviderError> {
        Err(ProviderError::Request("connection refused".to_string()))
    }
}
