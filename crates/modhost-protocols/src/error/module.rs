//! Module-related errors.

use thiserror::Error;

/// Error returned by module hooks and registration bridges.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Module initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Module shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("Connection not available: {0}")]
    NotConnected(String),

    #[error("Module panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Custom(String),
}

impl From<anyhow::Error> for ModuleError {
    fn from(err: anyhow::Error) -> Self {
        ModuleError::Custom(format!("{:#}", err))
    }
}
