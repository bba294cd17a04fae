//! Crate-level error types for `apigate-kernel`.
//!
//! [`KernelError`] covers startup-time failures (configuration, IO) and is
//! propagated inside an [`error_stack::Report`] so callers can attach
//! context on the way up. Per-request failures live in
//! [`crate::gateway::error`] instead.

use thiserror::Error;

/// Crate-level error type for `apigate-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Module registration failed.
    #[error("Registry error: {0}")]
    Registry(#[from] crate::gateway::RegistryError),

    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;
