//! Error types for the Rik assistant

use thiserror::Error;

/// Result type alias for Rik operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Rik assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend answered with a non-success status
    #[error("backend error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Text-to-speech error
    #[error("speech error: {0}")]
    Speech(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone or other capability access refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The shared recognition channel is held by another listening context
    #[error("recognition channel busy: held by {0}")]
    ChannelBusy(String),

    /// The session controller is no longer running
    #[error("session closed")]
    SessionClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
