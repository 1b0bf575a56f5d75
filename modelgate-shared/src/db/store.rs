//! Store access with bounded timeouts and retries.
//!
//! Every query the services issue goes through [`Store::run`]. Each attempt
//! gets its own deadline; transient failures (pool exhaustion, I/O,
//! serialization failures, deadlocks, deadline expiry) are retried with a
//! linear backoff, and once the attempts are spent the caller sees
//! [`StoreError::Unavailable`]. Anything else surfaces immediately.
//!
//! # Example
//!
//! ```no_run
//! use modelgate_shared::db::{RetryPolicy, Store};
//! use modelgate_shared::models::user::User;
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(pool, RetryPolicy::default());
//! let pool = store.pool();
//! let count = store.run("users.count", || User::count(pool)).await?;
//! println!("{count} users");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, warn};

/// SQLSTATE codes worth another attempt.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors produced by [`Store::run`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient failures persisted through every attempt
    #[error("store unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("check constraint violated: {constraint}")]
    CheckViolation { constraint: String },

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Name of the violated constraint, if the failure was a constraint violation.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint }
            | StoreError::ForeignKeyViolation { constraint }
            | StoreError::CheckViolation { constraint } => Some(constraint),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }

    pub fn is_foreign_key_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::ForeignKeyViolation { constraint } if constraint == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default().to_string();

            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation { constraint };
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation { constraint };
            }
            if db_err.is_check_violation() {
                return StoreError::CheckViolation { constraint };
            }
        }

        StoreError::Database(err)
    }
}

/// Whether a failed attempt may succeed if simply tried again.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Timeout and retry budget applied to every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,

    /// Deadline for a single attempt
    pub attempt_timeout: Duration,

    /// Base delay; attempt `n` waits `n * backoff` before retrying
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            ..Default::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut tried = 0;

        loop {
            tried += 1;

            let reason = match tokio::time::timeout(self.attempt_timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if is_transient(&err) => err.to_string(),
                Ok(Err(err)) => return Err(StoreError::from(err)),
                Err(_) => format!("attempt timed out after {:?}", self.attempt_timeout),
            };

            if tried >= max_attempts {
                warn!(operation, attempts = tried, %reason, "Store operation failed, giving up");
                return Err(StoreError::Unavailable {
                    attempts: tried,
                    reason,
                });
            }

            debug!(operation, attempt = tried, %reason, "Transient store failure, retrying");
            tokio::time::sleep(self.backoff * tried).await;
        }
    }
}

/// Connection pool plus the retry policy every query runs under.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
    retry: RetryPolicy,
}

impl Store {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Runs one store operation under the retry policy.
    ///
    /// `query` is invoked once per attempt, so it must rebuild its future
    /// from owned or borrowed inputs each time.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, query: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.retry.execute(operation, query).await
    }
}
