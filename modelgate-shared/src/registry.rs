//! Model registry
//!
//! CRUD over registered models, default-model resolution, and
//! synchronisation from a [`ModelProvider`]. Reads are open to any
//! authenticated caller; writes require an administrator.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::authorization::require_admin;
use crate::auth::middleware::AuthContext;
use crate::db::{Store, StoreError};
use crate::error::{AuthorityError, Resource};
use crate::models::model::{CreateModel, Model, ModelPatch, PROVIDER_MODEL_CONSTRAINT};
use crate::provider::{registration_for, ModelProvider};

/// Outcome of a provider sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub provider: String,

    /// Models registered by this sync
    pub created: Vec<Model>,

    /// Every registered model of the provider after the sync
    pub models: Vec<Model>,
}

fn map_model_conflict(err: StoreError) -> AuthorityError {
    if err.is_unique_violation(PROVIDER_MODEL_CONSTRAINT) {
        AuthorityError::DuplicateModel
    } else {
        err.into()
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    store: Store,
}

impl ModelRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(&self, actor: &AuthContext, data: CreateModel) -> Result<Model, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        let model = self
            .store
            .run("models.create", || Model::create(pool, data.clone()))
            .await
            .map_err(map_model_conflict)?;

        info!(
            model_id = %model.id,
            provider = %model.provider,
            provider_model_id = %model.provider_model_id,
            is_default = model.is_default,
            "Registered model"
        );
        Ok(model)
    }

    pub async fn get(&self, id: Uuid) -> Result<Model, AuthorityError> {
        let pool = self.store.pool();
        self.store
            .run("models.find_by_id", || Model::find_by_id(pool, id))
            .await?
            .ok_or(AuthorityError::NotFound(Resource::Model))
    }

    pub async fn list(&self) -> Result<Vec<Model>, AuthorityError> {
        let pool = self.store.pool();
        Ok(self.store.run("models.list", || Model::list(pool)).await?)
    }

    /// Applies a partial update. Setting `is_default` atomically moves the
    /// default flag to this model.
    pub async fn update(
        &self,
        actor: &AuthContext,
        id: Uuid,
        patch: ModelPatch,
    ) -> Result<Model, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        let model = self
            .store
            .run("models.update", || Model::update(pool, id, patch.clone()))
            .await?
            .ok_or(AuthorityError::NotFound(Resource::Model))?;

        info!(model_id = %id, is_default = model.is_default, is_active = model.is_active, "Updated model");
        Ok(model)
    }

    /// Makes `id` the one default model.
    pub async fn set_default(&self, actor: &AuthContext, id: Uuid) -> Result<Model, AuthorityError> {
        self.update(
            actor,
            id,
            ModelPatch {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    /// Deletes a model together with its access rules and usage history.
    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<(), AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        if !self.store.run("models.delete", || Model::delete(pool, id)).await? {
            return Err(AuthorityError::NotFound(Resource::Model));
        }

        info!(model_id = %id, "Deleted model");
        Ok(())
    }

    /// The model used when a caller names none.
    ///
    /// The active default wins; otherwise the oldest active model.
    ///
    /// # Errors
    ///
    /// `NoActiveModel` when no model is active.
    pub async fn get_default(&self) -> Result<Model, AuthorityError> {
        let pool = self.store.pool();

        if let Some(model) = self
            .store
            .run("models.find_default", || Model::find_default(pool))
            .await?
        {
            return Ok(model);
        }

        self.store
            .run("models.first_active", || Model::first_active(pool))
            .await?
            .ok_or(AuthorityError::NoActiveModel)
    }

    /// Registers every model the provider serves that is not registered yet.
    ///
    /// Existing registrations are left untouched, so running it twice is
    /// the same as running it once.
    pub async fn sync(
        &self,
        actor: &AuthContext,
        provider: &dyn ModelProvider,
    ) -> Result<SyncReport, AuthorityError> {
        require_admin(actor)?;

        let provider_name = provider.name().to_string();
        let discovered = provider.list_models().await.map_err(|e| {
            warn!(provider = %provider_name, error = %e, "Model provider sync failed");
            AuthorityError::from(e)
        })?;

        let pool = self.store.pool();
        let mut created = Vec::new();

        for discovered_model in &discovered {
            let data = registration_for(&provider_name, discovered_model);
            let inserted = self
                .store
                .run("models.insert_if_absent", || Model::insert_if_absent(pool, data.clone()))
                .await?;

            if let Some(model) = inserted {
                info!(model_id = %model.id, provider_model_id = %model.provider_model_id, "Registered model from provider");
                created.push(model);
            }
        }

        let models = self
            .store
            .run("models.list_by_provider", || Model::list_by_provider(pool, &provider_name))
            .await?;

        info!(
            provider = %provider_name,
            discovered = discovered.len(),
            created = created.len(),
            "Model sync finished"
        );

        Ok(SyncReport {
            provider: provider_name,
            created,
            models,
        })
    }
}
