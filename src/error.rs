//! Error types for the copy-trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Wire / schema errors
    #[error("Unsupported schema version: {0}")]
    SchemaVersion(String),

    #[error("Malformed trade event: {0}")]
    MalformedEvent(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // Router / execution errors
    #[error("Quote request failed: {0}")]
    Quote(String),

    #[error("Order submit failed: {0}")]
    Submit(String),

    #[error("Bundle rejected by block engine: {0}")]
    BundleRejected(String),

    // Position / order management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Journal append failed: {0}")]
    Journal(String),

    // Safety errors
    #[error("Panic sentinel active: {0}")]
    PanicActive(String),

    #[error("Daily loss limit reached: lost {lost_pct:.2}%, limit is {limit_pct:.2}%")]
    DailyLossLimitReached { lost_pct: f64, limit_pct: f64 },

    // Persisted-state errors
    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::Quote(_) | Error::Submit(_)
        )
    }

    /// Check if this error is a safety violation
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self,
            Error::PanicActive(_) | Error::DailyLossLimitReached { .. } | Error::CorruptState(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
