//! # ModelGate shared library
//!
//! Credential and access-control authority for an LLM gateway: who may
//! call which model, how much, and what they consumed.
//!
//! ## Module Organization
//!
//! - `auth`: password hashing, bearer tokens, account management
//! - `db`: connection pool, migrations, retrying store wrapper
//! - `models`: row types and their queries
//! - `registry`: model registry and provider sync
//! - `policy`: access decisions and access rule management
//! - `ledger`: usage recording and statistics
//! - `provider`: the model provider trait used by sync
//! - `error`: the shared error taxonomy

pub mod auth;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod policy;
pub mod provider;
pub mod registry;

pub use error::{AuthorityError, Resource};

/// Current version of the ModelGate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
