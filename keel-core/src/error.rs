// Error types for the Keel dispatch layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The injection scope could not produce an instance for a handler reference.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// A handler's operation failed or panicked.
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server is already listening")]
    AlreadyListening,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Deserialization(_) => 400,
            Error::Timeout(_) => 503,
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
