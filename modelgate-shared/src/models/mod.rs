/// Row types and their queries
///
/// - `user`: accounts and credentials
/// - `model`: registered LLM models and the single default
/// - `access_control`: per-user, per-model access rules and quotas
/// - `usage`: the append-only usage ledger and its aggregates
///
/// Functions here take a `&PgPool` and return raw `sqlx::Error`s; the
/// services built on them run each call through `db::Store`.

pub mod access_control;
pub mod model;
pub mod usage;
pub mod user;
