//! Shared library for the report chat Lambda functions.
//!
//! This crate provides the report catalog, the chat matcher and parameter
//! extractor, the connector client, and the common HTTP/auth plumbing used
//! by every Lambda.

pub mod auth;
pub mod config;
pub mod connector;
pub mod db;
pub mod error;
pub mod executor;
pub mod http;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod params;
pub mod secrets;
pub mod store;
pub mod template;

pub use auth::{resolve_caller, Caller};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::ReportExecutor;
pub use http::{body_response, error_response, finish, success_response};
pub use matcher::resolve;
pub use models::Role;
pub use params::{extract, ExtractedParameters};

use tracing_subscriber::EnvFilter;

/// Install the JSON log subscriber used by every Lambda.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
}
