//! Error types for the secrets injector

use thiserror::Error;

/// Main error type for process-level operations
///
/// Admission-level failures never surface here: they are expressed inside the
/// AdmissionReview returned to the API server (see [`crate::webhook`]).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid startup configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTPS server failed while serving
    #[error("server error: {0}")]
    Server(String),

    /// Filesystem error while reading configuration inputs
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a server error with the given message
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
