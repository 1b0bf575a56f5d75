//! Error taxonomy shared by every authority service.
//!
//! Module-level errors (`TokenError`, `AuthzError`, `StoreError`, ...)
//! convert into [`AuthorityError`]; the HTTP layer maps each variant to a
//! status code. `StoreUnavailable` is the only variant a caller should retry.

use std::fmt;

use crate::auth::authorization::AuthzError;
use crate::auth::jwt::TokenError;
use crate::auth::password::PasswordError;
use crate::db::StoreError;
use crate::provider::ProviderError;

/// Kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Model,
    AccessControl,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::User => "User",
            Resource::Model => "Model",
            Resource::AccessControl => "Access control",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Unknown user or wrong password; deliberately indistinguishable
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Inactive user")]
    InactiveUser,

    #[error("Username already registered")]
    DuplicateUsername,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    /// Role or ownership violation
    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot delete your own account")]
    SelfDeletion,

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("Access control already exists")]
    AccessControlAlreadyExists,

    #[error("Model already registered")]
    DuplicateModel,

    #[error("Model is not available")]
    ModelUnavailable,

    #[error("Access to this model has been revoked")]
    AccessRevoked,

    #[error("No access rule grants this model")]
    NoAccessRule,

    #[error("Token quota exceeded: {used} used today, {requested} requested, limit {limit}")]
    QuotaExceeded { limit: i64, used: i64, requested: i64 },

    #[error("No active models found")]
    NoActiveModel,

    #[error("Invalid usage record: {0}")]
    InvalidUsage(String),

    #[error("Model provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Transient store failure that outlasted the retry budget
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Password hashing failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Token signing failed: {0}")]
    TokenSigning(String),
}

impl AuthorityError {
    /// Whether the same call may succeed later without any change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthorityError::StoreUnavailable(_))
    }

    /// Failures that indicate a bug or an outage rather than a caller mistake
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthorityError::Store(_) | AuthorityError::Password(_) | AuthorityError::TokenSigning(_)
        )
    }
}

impl From<StoreError> for AuthorityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { reason, .. } => AuthorityError::StoreUnavailable(reason),
            other => AuthorityError::Store(other),
        }
    }
}

impl From<TokenError> for AuthorityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthorityError::ExpiredToken,
            TokenError::Invalid(_) => AuthorityError::InvalidToken,
            TokenError::Signing(msg) => AuthorityError::TokenSigning(msg),
        }
    }
}

impl From<AuthzError> for AuthorityError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::SelfDeletion => AuthorityError::SelfDeletion,
            other => AuthorityError::Forbidden(other.to_string()),
        }
    }
}
