//! Error types for toolgate.
//!
//! Every failure that crosses a component boundary carries a stable code
//! and a human-readable message. Domain errors live in their own enums and
//! convert into the top-level [`Error`] at the boundary.

use std::time::Duration;

/// Top-level error for the gateway pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Protocol(e) => e.code(),
            Error::Embedding(EmbeddingError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Error::Embedding(EmbeddingError::Provider { .. }) => "EMBEDDING_PROVIDER_ERROR",
            Error::Router(e) => e.code(),
            Error::Sandbox(e) => e.code(),
            Error::Credential(e) => e.code(),
            Error::Audit(_) => "AUDIT_HANDLER_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Optional remediation hint surfaced alongside the message.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Protocol(ProtocolError::UnsupportedProtocol { .. }) => {
                Some("supported protocol tags are: mcp, a2a, ucp, acp, v1, v2")
            }
            Error::Protocol(ProtocolError::PayloadTooLarge { .. }) => {
                Some("split the payload or raise MAX_PAYLOAD_BYTES")
            }
            Error::Router(RouterError::NoMatch { .. }) => {
                Some("rephrase the intent or register a matching tool")
            }
            Error::Sandbox(SandboxError::PoolExhausted { .. }) => {
                Some("retry later or raise SANDBOX_MAX_INSTANCES")
            }
            Error::Credential(CredentialError::Missing { .. }) => {
                Some("enroll the credential before invoking this tool")
            }
            _ => None,
        }
    }
}

/// Errors from the protocol adapter layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("unsupported protocol tag: {tag}")]
    UnsupportedProtocol { tag: String },

    #[error("parse failed ({code}): {message}")]
    Parse { code: &'static str, message: String },

    #[error("normalize failed ({code}): {message}")]
    Normalize { code: &'static str, message: String },

    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    pub fn parse(code: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            code,
            message: message.into(),
        }
    }

    pub fn normalize(code: &'static str, message: impl Into<String>) -> Self {
        Self::Normalize {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::UnsupportedProtocol { .. } => "UNSUPPORTED_PROTOCOL",
            ProtocolError::Parse { code, .. } => code,
            ProtocolError::Normalize { code, .. } => code,
            ProtocolError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }
}

/// Errors from the embedding service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding provider failed: {reason}")]
    Provider { reason: String },
}

/// A below-threshold candidate returned with a routing miss so the caller
/// can reprompt or escalate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RejectedCandidate {
    pub tool_id: String,
    pub score: f64,
}

/// Errors from the intent router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no tool matched intent '{action}'")]
    NoMatch {
        action: String,
        /// Up to three closest candidates that fell below the threshold.
        alternatives: Vec<RejectedCandidate>,
    },

    #[error("routing failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("routing exceeded the {deadline:?} deadline")]
    Timeout { deadline: Duration },
}

impl RouterError {
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::NoMatch { .. } => "NO_MATCH",
            RouterError::Embedding(_) => "ROUTING_ERROR",
            RouterError::Timeout { .. } => "TIMEOUT",
        }
    }
}

/// Errors from the sandbox runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("execution failed ({code}): {message}")]
    Execution { code: String, message: String },

    #[error("sandbox pool exhausted: all {max} instances busy")]
    PoolExhausted { max: usize },

    #[error("execution timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl SandboxError {
    pub fn execution(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::Execution { .. } => "EXECUTION_ERROR",
            SandboxError::PoolExhausted { .. } => "POOL_EXHAUSTED",
            SandboxError::Timeout { .. } => "TIMEOUT",
        }
    }
}

/// Errors from the credential lookup facade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    #[error("credential not found: {id}")]
    Missing { id: String },

    #[error("credential has expired: {id}")]
    Expired { id: String },
}

impl CredentialError {
    pub fn code(&self) -> &'static str {
        match self {
            CredentialError::Missing { .. } => "CREDENTIAL_MISSING",
            CredentialError::Expired { .. } => "CREDENTIAL_EXPIRED",
        }
    }
}

/// Errors raised by audit subscriber handlers.
///
/// These are contained by the stream: logged, never propagated to writers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("audit handler '{subscriber}' failed: {reason}")]
pub struct AuditError {
    pub subscriber: String,
    pub reason: String,
}

/// Configuration loading errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("{0}")]
    ParseError(String),
}
