//! Error types for PromptForge.
//!
//! Library crates use [`PromptForgeError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! External collaborators (embedding provider, vector index, judge,
//! rephraser, corpus loader) fail with [`CollaboratorError`]. The pipeline
//! pattern-matches on those results and degrades to a documented fallback;
//! collaborator failures are never surfaced to the caller as pipeline errors.

use std::path::PathBuf;

/// Top-level error type for all PromptForge operations.
#[derive(Debug, thiserror::Error)]
pub enum PromptForgeError {
    /// Invalid caller input (empty text, bad options). Never absorbed.
    #[error("input error: {message}")]
    Input { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PromptForgeError>;

impl PromptForgeError {
    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// CollaboratorError
// ---------------------------------------------------------------------------

/// Failure of an external collaborator call.
///
/// Each variant names the collaborating service so fallback decisions and
/// log lines stay attributable.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator is not configured, not ready, or empty.
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// Transport-level failure (connection, timeout, non-2xx status).
    #[error("{service} request failed: {reason}")]
    Request { service: String, reason: String },

    /// The collaborator answered, but the payload violates its contract.
    #[error("{service} returned malformed output: {reason}")]
    Malformed { service: String, reason: String },
}

impl CollaboratorError {
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn request(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Request {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// The service this error is attributed to.
    pub fn service(&self) -> &str {
        match self {
            Self::Unavailable { service, .. }
            | Self::Request { service, .. }
            | Self::Malformed { service, .. } => service,
        }
    }
}

/// Alias for collaborator call results.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PromptForgeError::input("text must not be empty");
        assert_eq!(err.to_string(), "input error: text must not be empty");

        let err = PromptForgeError::config("missing corpus path");
        assert_eq!(err.to_string(), "config error: missing corpus path");
    }

    #[test]
    fn collaborator_error_names_service() {
        let err = CollaboratorError::unavailable("vector-index", "0 entries");
        assert_eq!(err.service(), "vector-index");
        assert_eq!(err.to_string(), "vector-index unavailable: 0 entries");

        let err = CollaboratorError::malformed("rephraser", "missing attribution marker");
        assert!(err.to_string().contains("malformed"));
    }
}
