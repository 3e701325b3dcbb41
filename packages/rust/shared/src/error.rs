//! Error types for ServiceCraft.
//!
//! Library crates use [`ServiceCraftError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ServiceCraft operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceCraftError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure talking to the text-generation provider.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered, but not with a usable completion.
    #[error("provider error: {0}")]
    Provider(String),

    /// Malformed input document (rule set, alias table, request file).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request validation error (missing source, empty practice id, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Blueprint artifact rendering error.
    #[error("compile error: {message}")]
    Compile { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ServiceCraftError>;

impl ServiceCraftError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a compile error from any displayable message.
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile {
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

    /// Whether this error came from the generation provider (transport or response).
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Provider { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ServiceCraftError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ServiceCraftError::validation("practice_id is required");
        assert!(err.to_string().contains("practice_id"));
    }

    #[test]
    fn provider_failures_are_classified() {
        assert!(ServiceCraftError::Network("timed out".into()).is_provider_failure());
        assert!(ServiceCraftError::Provider("HTTP 502".into()).is_provider_failure());
        assert!(!ServiceCraftError::Storage("locked".into()).is_provider_failure());
    }

    #[test]
    fn helpers_build_matching_variants() {
        assert!(matches!(ServiceCraftError::config("x"), ServiceCraftError::Config { .. }));
        assert!(matches!(ServiceCraftError::parse("x"), ServiceCraftError::Parse { .. }));
        assert!(matches!(ServiceCraftError::validation("x"), ServiceCraftError::Validation { .. }));
        assert!(matches!(ServiceCraftError::compile("x"), ServiceCraftError::Compile { .. }));
        let io = ServiceCraftError::io("rules.toml", std::io::Error::other("gone"));
        assert!(matches!(io, ServiceCraftError::Io { .. }));
        assert!(io.to_string().contains("rules.toml"));
        // Brace patterns also match the tuple variants.
        assert!(matches!(ServiceCraftError::Storage("locked".into()), ServiceCraftError::Storage { .. }));
    }
}
