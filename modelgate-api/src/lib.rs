//! # ModelGate API server library
//!
//! HTTP surface of the ModelGate credential and access-control authority.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Request correlation IDs
//! - `ollama`: Ollama model provider used by model sync
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod ollama;
pub mod routes;
