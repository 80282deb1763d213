//! Sync error types.

use thiserror::Error;

/// Sync error type.
///
/// These never cross the client's public API as failures; they describe
/// what went wrong inside the transport and are logged or folded into
/// connection events.
#[derive(Error, Debug)]
pub enum SyncError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Socket URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Unsupported URL scheme for a WebSocket endpoint
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No access token available
    #[error("No access token available")]
    MissingCredential,
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
