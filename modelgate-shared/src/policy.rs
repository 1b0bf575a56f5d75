/// Access policy: may this user call this model right now?
///
/// Decisions are made in a fixed order:
///
/// 1. The model must exist and be active, else `model_unavailable`.
/// 2. If a rule exists for (user, model), `can_use` must be true, else
///    `access_revoked`. Without a rule the configured default applies
///    (`default_allow`; when false the decision is `no_access_rule`).
/// 3. If the rule has a `token_limit`, today's (UTC) usage plus the
///    requested tokens must stay within it, else `quota_exceeded`.
///
/// The quota read is best effort: two requests racing on the last tokens of
/// a quota can both be allowed.
///
/// # Example
///
/// ```no_run
/// use modelgate_shared::db::{RetryPolicy, Store};
/// use modelgate_shared::policy::{AccessPolicy, Decision, PolicyConfig};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid, model_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let policy = AccessPolicy::new(Store::new(pool, RetryPolicy::default()), PolicyConfig::default());
///
/// match policy.authorize(user_id, model_id, Some(500)).await? {
///     Decision::Allow { remaining, .. } => println!("allowed, {:?} tokens left today", remaining),
///     Decision::Deny(reason) => println!("denied: {}", reason),
/// }
/// # Ok(())
/// # }
/// ```

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::authorization::{require_admin, require_self_or_admin};
use crate::auth::middleware::AuthContext;
use crate::db::{Store, StoreError};
use crate::error::{AuthorityError, Resource};
use crate::models::access_control::{
    AccessControl, AccessControlPatch, CreateAccessControl, MODEL_FK_CONSTRAINT, MODEL_USER_CONSTRAINT,
    USER_FK_CONSTRAINT,
};
use crate::models::model::Model;
use crate::models::usage::{start_of_day, UsageLog};

/// Policy settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Decision when no rule exists for (user, model)
    pub default_allow: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { default_allow: true }
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    ModelUnavailable,
    AccessRevoked,
    NoAccessRule,
    QuotaExceeded { limit: i64, used: i64, requested: i64 },
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::ModelUnavailable => "model_unavailable",
            DenyReason::AccessRevoked => "access_revoked",
            DenyReason::NoAccessRule => "no_access_rule",
            DenyReason::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DenyReason> for AuthorityError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::ModelUnavailable => AuthorityError::ModelUnavailable,
            DenyReason::AccessRevoked => AuthorityError::AccessRevoked,
            DenyReason::NoAccessRule => AuthorityError::NoAccessRule,
            DenyReason::QuotaExceeded {
                limit,
                used,
                requested,
            } => AuthorityError::QuotaExceeded {
                limit,
                used,
                requested,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        /// Daily limit in force, if any
        token_limit: Option<i64>,

        /// Tokens left today after this request, if limited
        remaining: Option<i64>,
    },
    Deny(DenyReason),
}

impl Decision {
    pub fn unlimited() -> Self {
        Decision::Allow {
            token_limit: None,
            remaining: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Step 1: the model must exist and be active.
pub fn check_model(model: Option<&Model>) -> Result<(), DenyReason> {
    match model {
        Some(model) if model.is_active => Ok(()),
        _ => Err(DenyReason::ModelUnavailable),
    }
}

/// Step 2: returns the token limit to enforce, if any.
pub fn check_rule(rule: Option<&AccessControl>, config: &PolicyConfig) -> Result<Option<i64>, DenyReason> {
    match rule {
        Some(rule) if !rule.can_use => Err(DenyReason::AccessRevoked),
        Some(rule) => Ok(rule.token_limit),
        None if config.default_allow => Ok(None),
        None => Err(DenyReason::NoAccessRule),
    }
}

/// Step 3: quota against today's usage.
///
/// A request is over quota when `used + requested > limit`; with nothing
/// requested an exhausted quota (`used >= limit`) also denies.
///
/// A bare "may I call?" check (0 tokens) treats a fully spent quota as
/// exhausted, so `used == limit` denies it.
pub fn check_quota(limit: i64, used: i64, requested: i64) -> Decision {
    let projected = used.saturating_add(requested);
    let exhausted = requested == 0 && used >= limit;

    if projected > limit || exhausted {
        Decision::Deny(DenyReason::QuotaExceeded {
            limit,
            used,
            requested,
        })
    } else {
        Decision::Allow {
            token_limit: Some(limit),
            remaining: Some(limit - projected),
        }
    }
}

fn map_rule_conflict(err: StoreError) -> AuthorityError {
    if err.is_unique_violation(MODEL_USER_CONSTRAINT) {
        AuthorityError::AccessControlAlreadyExists
    } else if err.is_foreign_key_violation(MODEL_FK_CONSTRAINT) {
        AuthorityError::NotFound(Resource::Model)
    } else if err.is_foreign_key_violation(USER_FK_CONSTRAINT) {
        AuthorityError::NotFound(Resource::User)
    } else {
        err.into()
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    store: Store,
    config: PolicyConfig,
}

impl AccessPolicy {
    pub fn new(store: Store, config: PolicyConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decides whether `user_id` may call `model_id` for `requested_tokens`
    /// more tokens (default 0, negatives count as 0).
    pub async fn authorize(
        &self,
        user_id: Uuid,
        model_id: Uuid,
        requested_tokens: Option<i64>,
    ) -> Result<Decision, AuthorityError> {
        let requested = requested_tokens.unwrap_or(0).max(0);
        let pool = self.store.pool();

        let model = self
            .store
            .run("models.find_by_id", || Model::find_by_id(pool, model_id))
            .await?;
        if let Err(reason) = check_model(model.as_ref()) {
            return Ok(self.deny(user_id, model_id, reason));
        }

        let rule = self
            .store
            .run("access.find_for", || AccessControl::find_for(pool, user_id, model_id))
            .await?;
        let limit = match check_rule(rule.as_ref(), &self.config) {
            Ok(limit) => limit,
            Err(reason) => return Ok(self.deny(user_id, model_id, reason)),
        };

        let Some(limit) = limit else {
            return Ok(Decision::unlimited());
        };

        let since = start_of_day(Utc::now());
        let used = self
            .store
            .run("usage.tokens_used_since", || {
                UsageLog::tokens_used_since(pool, user_id, model_id, since)
            })
            .await?;

        let decision = check_quota(limit, used, requested);
        if let Decision::Deny(reason) = decision {
            return Ok(self.deny(user_id, model_id, reason));
        }

        Ok(decision)
    }

    /// Like [`authorize`](Self::authorize) but turns a denial into an error.
    pub async fn enforce(
        &self,
        user_id: Uuid,
        model_id: Uuid,
        requested_tokens: Option<i64>,
    ) -> Result<Decision, AuthorityError> {
        match self.authorize(user_id, model_id, requested_tokens).await? {
            Decision::Deny(reason) => Err(reason.into()),
            allowed => Ok(allowed),
        }
    }

    fn deny(&self, user_id: Uuid, model_id: Uuid, reason: DenyReason) -> Decision {
        debug!(%user_id, %model_id, %reason, "Access denied");
        Decision::Deny(reason)
    }

    /// Admin only.
    ///
    /// # Errors
    ///
    /// `AccessControlAlreadyExists` if the pair already has a rule, also
    /// when two creates race; `NotFound` if the model or user is missing.
    pub async fn grant(
        &self,
        actor: &AuthContext,
        data: CreateAccessControl,
    ) -> Result<AccessControl, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        let rule = self
            .store
            .run("access.create", || AccessControl::create(pool, data.clone()))
            .await
            .map_err(map_rule_conflict)?;

        info!(
            access_id = %rule.id,
            model_id = %rule.model_id,
            user_id = %rule.user_id,
            can_use = rule.can_use,
            token_limit = ?rule.token_limit,
            "Created access rule"
        );
        Ok(rule)
    }

    pub async fn get(&self, actor: &AuthContext, id: Uuid) -> Result<AccessControl, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        self.store
            .run("access.find_by_id", || AccessControl::find_by_id(pool, id))
            .await?
            .ok_or(AuthorityError::NotFound(Resource::AccessControl))
    }

    /// Changes `can_use` and/or the quota of an existing rule. Admin only.
    pub async fn update(
        &self,
        actor: &AuthContext,
        id: Uuid,
        patch: AccessControlPatch,
    ) -> Result<AccessControl, AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        let rule = self
            .store
            .run("access.update", || AccessControl::update(pool, id, patch.clone()))
            .await?
            .ok_or(AuthorityError::NotFound(Resource::AccessControl))?;

        info!(access_id = %id, can_use = rule.can_use, token_limit = ?rule.token_limit, "Updated access rule");
        Ok(rule)
    }

    /// Shorthand for setting `can_use = false`.
    pub async fn revoke(&self, actor: &AuthContext, id: Uuid) -> Result<AccessControl, AuthorityError> {
        let patch = AccessControlPatch {
            can_use: Some(false),
            ..Default::default()
        };
        self.update(actor, id, patch).await
    }

    /// Sets or clears the daily token limit.
    pub async fn set_quota(
        &self,
        actor: &AuthContext,
        id: Uuid,
        token_limit: Option<i64>,
    ) -> Result<AccessControl, AuthorityError> {
        let patch = AccessControlPatch {
            token_limit: Some(token_limit),
            ..Default::default()
        };
        self.update(actor, id, patch).await
    }

    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<(), AuthorityError> {
        require_admin(actor)?;

        let pool = self.store.pool();
        if !self.store.run("access.delete", || AccessControl::delete(pool, id)).await? {
            return Err(AuthorityError::NotFound(Resource::AccessControl));
        }

        info!(access_id = %id, "Deleted access rule");
        Ok(())
    }

    /// Rules of one user; the user themselves or an admin.
    pub async fn list_for_user(
        &self,
        actor: &AuthContext,
        user_id: Uuid,
    ) -> Result<Vec<AccessControl>, AuthorityError> {
        require_self_or_admin(actor, user_id)?;

        let pool = self.store.pool();
        Ok(self
            .store
            .run("access.list_by_user", || AccessControl::list_by_user(pool, user_id))
            .await?)
    }
}
