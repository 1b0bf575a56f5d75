/// Account registration, login and management
///
/// [`Accounts`] owns the rules around user records: passwords are hashed
/// before they reach the store, login failures look the same whether the
/// username exists or not, the first account becomes the administrator,
/// and privilege checks run before any write.
///
/// # Example
///
/// ```no_run
/// use modelgate_shared::auth::credentials::{Accounts, NewAccount};
/// use modelgate_shared::db::{RetryPolicy, Store};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let accounts = Accounts::new(Store::new(pool, RetryPolicy::default()));
///
/// accounts.register(NewAccount {
///     username: "alice".to_string(),
///     email: "alice@example.com".to_string(),
///     password: "correct horse".to_string(),
///     full_name: None,
/// }).await?;
///
/// let user = accounts.authenticate("alice", "correct horse").await?;
/// assert!(user.is_admin);
/// # Ok(())
/// # }
/// ```

use tracing::{debug, info};
use uuid::Uuid;

use super::authorization::{require_admin, require_can_delete, require_can_update};
use super::middleware::AuthContext;
use super::password::{dummy_hash, hash_password, verify_password, PasswordError};
use crate::db::{Store, StoreError};
use crate::error::{AuthorityError, Resource};
use crate::models::user::{CreateUser, User, UserPatch, EMAIL_CONSTRAINT, USERNAME_CONSTRAINT};

/// Page size used when a caller does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Registration input with the plaintext password
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Requested account changes; the password is plaintext and re-hashed.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub full_name: Option<Option<String>>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

fn map_user_conflict(err: StoreError) -> AuthorityError {
    if err.is_unique_violation(USERNAME_CONSTRAINT) {
        AuthorityError::DuplicateUsername
    } else if err.is_unique_violation(EMAIL_CONSTRAINT) {
        AuthorityError::DuplicateEmail
    } else {
        err.into()
    }
}

/// Argon2 runs on the blocking pool, off the runtime workers.
async fn hash_blocking(password: String) -> Result<String, AuthorityError> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::HashError(format!("hashing task failed: {}", e)))??;
    Ok(hashed)
}

/// Verifies against `hash`, or the dummy hash when there is no user.
async fn verify_blocking(password: String, hash: Option<String>) -> Result<bool, AuthorityError> {
    let task = tokio::task::spawn_blocking(move || {
        let hash = hash.as_deref().unwrap_or_else(|| dummy_hash());
        verify_password(&password, hash)
    });
    let verified = task
        .await
        .map_err(|e| PasswordError::HashError(format!("verification task failed: {}", e)))?;
    Ok(verified)
}

#[derive(Debug, Clone)]
pub struct Accounts {
    store: Store,
}

impl Accounts {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates an account. The very first account is made administrator.
    ///
    /// # Errors
    ///
    /// `DuplicateUsername` / `DuplicateEmail` when either is taken.
    pub async fn register(&self, account: NewAccount) -> Result<User, AuthorityError> {
        let data = CreateUser {
            username: account.username,
            email: account.email,
            hashed_password: hash_blocking(account.password).await?,
            full_name: account.full_name,
        };

        let pool = self.store.pool();
        let user = self
            .store
            .run("users.create", || User::create(pool, data.clone()))
            .await
            .map_err(map_user_conflict)?;

        info!(user_id = %user.id, username = %user.username, "Registered user");
        if user.is_admin {
            info!(user_id = %user.id, "First account registered; granted administrator");
        }

        Ok(user)
    }

    /// Checks a username and password.
    ///
    /// Unknown usernames are verified against a dummy hash so both failure
    /// paths cost the same and return the same error.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthorityError> {
        let pool = self.store.pool();
        let user = self
            .store
            .run("users.find_by_username", || User::find_by_username(pool, username))
            .await?;

        let stored_hash = user.as_ref().map(|u| u.hashed_password.clone());
        let verified = verify_blocking(password.to_string(), stored_hash).await?;

        match user {
            Some(user) if verified => {
                if !user.is_active {
                    debug!(user_id = %user.id, "Login rejected for inactive user");
                    return Err(AuthorityError::InactiveUser);
                }
                Ok(user)
            }
            _ => {
                debug!("Login rejected");
                Err(AuthorityError::InvalidCredentials)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, AuthorityError> {
        let pool = self.store.pool();
        self.store
            .run("users.find_by_id", || User::find_by_id(pool, id))
            .await?
            .ok_or(AuthorityError::NotFound(Resource::User))
    }

    /// Admin only. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list(&self, actor: &AuthContext, skip: i64, limit: i64) -> Result<Vec<User>, AuthorityError> {
        require_admin(actor)?;

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let skip = skip.max(0);
        let pool = self.store.pool();

        Ok(self
            .store
            .run("users.list", || User::list(pool, limit, skip))
            .await?)
    }

    /// Self or admin; changing `is_admin` or `is_active` requires admin.
    pub async fn update(
        &self,
        actor: &AuthContext,
        id: Uuid,
        update: AccountUpdate,
    ) -> Result<User, AuthorityError> {
        let changes_privileged = update.is_admin.is_some() || update.is_active.is_some();
        require_can_update(actor, id, changes_privileged)?;

        let hashed_password = match update.password {
            Some(password) => Some(hash_blocking(password).await?),
            None => None,
        };
        let patch = UserPatch {
            email: update.email,
            full_name: update.full_name,
            hashed_password,
            is_active: update.is_active,
            is_admin: update.is_admin,
        };

        let pool = self.store.pool();
        let user = self
            .store
            .run("users.update", || User::update(pool, id, patch.clone()))
            .await
            .map_err(map_user_conflict)?
            .ok_or(AuthorityError::NotFound(Resource::User))?;

        info!(user_id = %id, actor = %actor.user_id, "Updated user");
        Ok(user)
    }

    /// Admin only, and never the caller's own account.
    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<(), AuthorityError> {
        require_can_delete(actor, id)?;

        let pool = self.store.pool();
        let deleted = self
            .store
            .run("users.delete", || User::delete(pool, id))
            .await?;

        if !deleted {
            return Err(AuthorityError::NotFound(Resource::User));
        }

        info!(user_id = %id, actor = %actor.user_id, "Deleted user");
        Ok(())
    }
}
