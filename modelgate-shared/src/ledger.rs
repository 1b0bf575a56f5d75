//! Usage ledger: append-only record of model calls and its aggregates.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::authorization::{require_admin, require_self_or_admin};
use crate::auth::credentials::MAX_PAGE_SIZE;
use crate::auth::middleware::AuthContext;
use crate::db::{Store, StoreError};
use crate::error::{AuthorityError, Resource};
use crate::models::usage::{start_of_day, ModelUsageStats, NewUsage, UsageLog, MODEL_FK_CONSTRAINT};

/// Largest prompt or completion count a single entry may carry.
pub const MAX_TOKENS_PER_ENTRY: i64 = i32::MAX as i64;

/// Rejects entries the ledger must never hold.
pub fn validate_entry(entry: &NewUsage) -> Result<(), AuthorityError> {
    if entry.prompt_tokens < 0 || entry.completion_tokens < 0 {
        return Err(AuthorityError::InvalidUsage(
            "token counts must not be negative".to_string(),
        ));
    }
    if entry.prompt_tokens > MAX_TOKENS_PER_ENTRY || entry.completion_tokens > MAX_TOKENS_PER_ENTRY {
        return Err(AuthorityError::InvalidUsage(format!(
            "token counts must not exceed {}",
            MAX_TOKENS_PER_ENTRY
        )));
    }
    if !entry.latency_ms.is_finite() || entry.latency_ms < 0.0 {
        return Err(AuthorityError::InvalidUsage(
            "latency_ms must be a non-negative number".to_string(),
        ));
    }
    if entry.request_type.trim().is_empty() {
        return Err(AuthorityError::InvalidUsage(
            "request_type must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UsageLedger {
    store: Store,
}

impl UsageLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Appends one entry; `total_tokens` is computed here.
    ///
    /// Once this returns the entry is committed, whatever happens to the
    /// caller afterwards.
    pub async fn record(&self, entry: NewUsage) -> Result<UsageLog, AuthorityError> {
        validate_entry(&entry)?;

        let pool = self.store.pool();
        let log = self
            .store
            .run("usage.record", || UsageLog::record(pool, &entry))
            .await
            .map_err(|err: StoreError| {
                if err.is_foreign_key_violation(MODEL_FK_CONSTRAINT) {
                    AuthorityError::NotFound(Resource::Model)
                } else {
                    err.into()
                }
            })?;

        info!(
            usage_id = %log.id,
            model_id = %log.model_id,
            user_id = %log.user_id,
            request_type = %log.request_type,
            total_tokens = log.total_tokens,
            latency_ms = log.latency_ms,
            "Recorded usage"
        );
        Ok(log)
    }

    /// Tokens consumed by the pair since midnight UTC.
    pub async fn used_today(&self, user_id: Uuid, model_id: Uuid) -> Result<i64, AuthorityError> {
        let since = start_of_day(Utc::now());
        let pool = self.store.pool();

        Ok(self
            .store
            .run("usage.tokens_used_since", || {
                UsageLog::tokens_used_since(pool, user_id, model_id, since)
            })
            .await?)
    }

    /// Latest entries of one user, newest first; the user themselves or an
    /// admin. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn history(
        &self,
        actor: &AuthContext,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageLog>, AuthorityError> {
        require_self_or_admin(actor, user_id)?;

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let pool = self.store.pool();
        Ok(self
            .store
            .run("usage.list_by_user", || UsageLog::list_by_user(pool, user_id, limit))
            .await?)
    }

    /// Per-model totals; models without entries report zeros. Admin only.
    pub async fn stats_by_model(&self, actor: &AuthContext) -> Result<Vec<ModelUsageStats>, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        Ok(self
            .store
            .run("usage.stats_by_model", || UsageLog::stats_by_model(pool))
            .await?)
    }
}
