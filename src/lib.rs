//! OpenAPI Toolkit
//!
//! Turns OpenAPI documents into callable, validated tools for AI agents and
//! executes them against the real HTTP API, with an optional human approval
//! step before any call goes out.
//!
//! # Features
//!
//! - **Schema translation**: `$ref` resolution (cycle-safe), tuples,
//!   `oneOf/anyOf/allOf`, binary fields, nullable types
//! - **Stable tool names**: `operationId`, `x-tool-name` or a synthetic
//!   `method_path` id, deduplicated and sanitized
//! - **Request assembly**: path/query/header/body groups, preset body fields,
//!   encrypted auth secrets (`x-auth-secrets`, AES-256-GCM)
//! - **Human in the loop**: pause a call, resume it exactly once with an
//!   approval (and argument overrides) or a denial
//! - **Stream rewriting**: paused results become synthetic
//!   `FAKE_HUMAN_INTERACTION` tool calls in model output streams
//! - **History resume**: human answers in a chat history run the paused
//!   calls and replace the synthetic calls with the real results
//! - **Multi-API**: several documents behind one namespaced tool surface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use openapi_toolkit::engine::{ApiClient, CallOptions, HumanDecision, PatternPolicy, ToolClient};
//! use serde_json::json;
//!
//! # async fn run(document: serde_json::Value) -> openapi_toolkit::Result<()> {
//! let client = ApiClient::builder(document)
//!     .policy(Arc::new(PatternPolicy::new(&["^delete"])?))
//!     .build()?;
//!
//! let outcome = client
//!     .execute("deletePet", json!({ "path": { "petId": 10 } }), CallOptions::new("call_1"))
//!     .await?;
//! if outcome.is_paused() {
//!     let done = client.resume("call_1", HumanDecision::approve(), CallOptions::default()).await?;
//!     println!("{}", done.to_json());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod pending;
pub mod registry;
pub mod request;
pub mod schema;
pub mod stream;
pub mod toolkit;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` overrides `level` when set. Logs go to stderr so command output
/// on stdout stays machine-readable.
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Failed to initialise tracing: {e}")))
}
