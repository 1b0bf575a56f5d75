/// Database layer
///
/// - `pool`: connection pool construction and health checks
/// - `migrations`: embedded schema migrations
/// - `store`: the pool wrapped with per-call timeouts and bounded retries
///
/// Row types and their queries live in the crate-level `models` module.

pub mod migrations;
pub mod pool;
pub mod store;

pub use store::{RetryPolicy, Store, StoreError};
