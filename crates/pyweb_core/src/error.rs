//! Error taxonomy for the embedding bridge.

use thiserror::Error;

pub type EmbedResult<T> = Result<T, EmbedError>;

/// Every failure a script unit or bridge operation can surface to the
/// host. Sandbox denials are always errors, never silent no-ops, so
/// page authors can observe them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    /// Malformed guest source. Terminal for the script unit.
    #[error("compile error in {filename}: {message}")]
    Compile { filename: String, message: String },

    /// A blocked builtin, module, network target, or filesystem access.
    #[error("security violation: {0}")]
    Security(String),

    /// A recursion, CPU, or memory ceiling was hit.
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),

    /// An unsupported value crossed the boundary.
    #[error("bridge conversion failed: {0}")]
    Conversion(String),

    /// The guest interpreter failed to initialize or has been shut down.
    #[error("guest engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A guest exception that maps to no narrower category, carrying the
    /// captured type name, message, and best-effort formatted traceback.
    #[error("guest exception {type_name}: {message}")]
    Guest {
        type_name: String,
        message: String,
        traceback: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EmbedError {
    pub fn engine_unavailable() -> Self {
        EmbedError::EngineUnavailable("interpreter is not in the Ready state".to_string())
    }

    /// True for errors the sandbox raised to deny a capability.
    pub fn is_security(&self) -> bool {
        matches!(self, EmbedError::Security(_))
    }

    pub fn is_resource_exceeded(&self) -> bool {
        matches!(self, EmbedError::ResourceExceeded(_))
    }
}
