//! Error types for the OpenAPI toolkit

use std::io;

use serde_json::{Value, json};
use thiserror::Error;

/// Result type alias for the toolkit
pub type Result<T> = std::result::Result<T, Error>;

/// Toolkit errors
///
/// Translation and discovery problems never surface here: they degrade to
/// warnings and fallbacks. Everything on the execution path does.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The OpenAPI document could not be loaded or parsed
    #[error("Document error: {0}")]
    Document(String),

    /// Tool arguments failed validation against the call schema
    #[error("{message}")]
    SchemaValidation {
        /// Tool the arguments were meant for
        tool: String,
        /// Model-readable description of every violation
        message: String,
    },

    /// No operation with this id exists in the registry
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// A namespaced id that does not follow `<client>__<operation>`
    #[error("Invalid operation id: {0}")]
    InvalidOperationId(String),

    /// No client registered under this name
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// Resume was requested for a tool call that has no pending context
    #[error("No pending context for tool call '{0}'")]
    PendingContextNotFound(String),

    /// A human's reply to an approval prompt could not be read
    #[error("Invalid human input for tool call '{tool_call_id}': {reason}")]
    InvalidHumanInput {
        /// Synthetic approval call the reply answers
        tool_call_id: String,
        /// What was wrong with it
        reason: String,
    },

    /// The outbound HTTP request failed before a response arrived
    #[error("Execution of '{operation}' failed: {source}")]
    Execution {
        /// Operation being executed
        operation: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The caller cancelled the call
    #[error("Tool call '{0}' was cancelled")]
    Cancelled(String),

    /// Secret encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-readable kind, stable across releases
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Document(_) => "document",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::OperationNotFound(_) => "operation_not_found",
            Self::InvalidOperationId(_) => "invalid_operation_id",
            Self::ClientNotFound(_) => "client_not_found",
            Self::PendingContextNotFound(_) => "pending_context_not_found",
            Self::InvalidHumanInput { .. } => "invalid_human_input",
            Self::Execution { .. } => "execution",
            Self::Cancelled(_) => "cancelled",
            Self::Crypto(_) => "crypto",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Render as a structured tool error the model can read
    #[must_use]
    pub fn to_tool_error(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }

    /// Whether the model can fix this by changing its arguments
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SchemaValidation { .. }
                | Self::OperationNotFound(_)
                | Self::InvalidOperationId(_)
                | Self::ClientNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_carries_kind_and_message() {
        let err = Error::PendingContextNotFound("T1".to_string());
        let value = err.to_tool_error();

        assert_eq!(value["error"]["kind"], "pending_context_not_found");
        assert_eq!(
            value["error"]["message"],
            "No pending context for tool call 'T1'"
        );
    }

    #[test]
    fn validation_errors_are_recoverable_pending_errors_are_not() {
        let validation = Error::SchemaValidation {
            tool: "getPet".to_string(),
            message: "bad".to_string(),
        };
        assert!(validation.is_recoverable());
        assert!(!Error::PendingContextNotFound("x".to_string()).is_recoverable());
        assert!(!Error::Cancelled("x".to_string()).is_recoverable());
    }
}
