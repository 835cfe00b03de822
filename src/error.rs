//! WolfCache Error Types

use thiserror::Error;

/// Result type alias for WolfCache operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfCache error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Record errors
    #[error("Integrity violation for record {id}: {reason}")]
    Integrity { id: String, reason: String },

    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    // Server errors
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Protocol error from {address}: {reason}")]
    Protocol { address: String, reason: String },

    #[error("Server error from {address}: {message}")]
    ServerError { address: String, message: String },

    #[error("Key rejected by client: {0}")]
    InvalidKey(String),

    #[error("Value not stored on {0}")]
    NotStored(String),

    #[error("No server available in group {0}")]
    NoServerAvailable(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error must terminate the process (or request)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::ConfigParse(_) | Error::Integrity { .. }
        )
    }

    /// Check if this error is a server being unavailable, which callers absorb
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::Protocol { .. }
                | Error::ServerError { .. }
                | Error::NotStored(_)
                | Error::NoServerAvailable(_)
                | Error::Io(_)
        )
    }

    /// Process exit code used when a fatal error reaches `main`
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Integrity { .. } => 2,
            _ => 1,
        }
    }
}
