//! Error types for agsbox.
//!
//! Every remote failure is wrapped with enough context (operation name,
//! target id/name, provider code) to diagnose without re-running, and every
//! user-visible failure names the next corrective action.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using agsbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for agsbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration (local, never retried)
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Tool lifecycle
    // =========================================================================
    #[error("Tool creation rejected ({code}): {message}")]
    ToolCreation { code: String, message: String },

    #[error("Tool {tool_id} entered FAILED state and will never become ACTIVE: {message}")]
    ToolActivation { tool_id: String, message: String },

    #[error("Tool {tool_id} did not become ACTIVE within {waited:?}")]
    ToolTimeout { tool_id: String, waited: Duration },

    #[error("Tool '{0}' not found; register it first with ToolManager::create_tool")]
    ToolNotFound(String),

    // =========================================================================
    // Instance lifecycle
    // =========================================================================
    #[error("Instance start rejected ({code}): {message}")]
    InstanceStart { code: String, message: String },

    // =========================================================================
    // Access plane
    // =========================================================================
    #[error("Token acquisition failed for instance {instance_id}: {message}")]
    TokenAcquisition {
        instance_id: String,
        message: String,
    },

    #[error("Token for instance {instance_id} has expired; acquire a new one")]
    TokenExpired { instance_id: String },

    // =========================================================================
    // Execution plane
    // =========================================================================
    #[error("No sandbox tool matches '{0}'; run tool registration first")]
    SandboxResolution(String),

    #[error("Session does not support {capability}; use {fallback} instead")]
    UnsupportedCapability { capability: String, fallback: String },

    // =========================================================================
    // Generic remote / serialization
    // =========================================================================
    #[error("{operation} failed ({code}): {message}")]
    Api {
        operation: String,
        code: String,
        message: String,
    },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a tool creation error carrying the provider code and message.
    pub fn tool_creation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolCreation {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create an instance start error carrying the provider code and message.
    pub fn instance_start(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InstanceStart {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a sandbox resolution error.
    pub fn sandbox_resolution(name: impl Into<String>) -> Self {
        Self::SandboxResolution(name.into())
    }

    /// Create an unsupported capability error naming the fallback path.
    pub fn unsupported_capability(
        capability: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self::UnsupportedCapability {
            capability: capability.into(),
            fallback: fallback.into(),
        }
    }

    /// Wrap a provider rejection with the operation it came from.
    pub fn api(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP transport error.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }
}
